//! Settings read once from `NOVA_*` environment variables.

use std::sync::OnceLock;

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Env {
    /// `NOVA_TRACE=1`: print every executed record to stderr
    pub trace: bool,
}

static ENV: OnceLock<Env> = OnceLock::new();

impl Env {
    /// Build settings from any variable source. Unset variables keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Env {
            trace: lookup("NOVA_TRACE").as_deref() == Some("1"),
        }
    }
}

/// Snapshot the process environment. Later calls return the first snapshot.
pub fn init() -> Env {
    *ENV.get_or_init(|| Env::from_lookup(|name| std::env::var(name).ok()))
}

/// Off until [`init`] has run.
pub fn is_trace_enabled() -> bool {
    ENV.get().is_some_and(|env| env.trace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_needs_exact_value() {
        let env = |value: &'static str| {
            Env::from_lookup(move |name| (name == "NOVA_TRACE").then(|| value.to_string()))
        };
        assert!(env("1").trace);
        assert!(!env("0").trace);
        assert!(!env("yes").trace);
        assert_eq!(Env::from_lookup(|_| None), Env::default());
    }
}
