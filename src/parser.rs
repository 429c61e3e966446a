use std::iter::Peekable;

use crate::{
    air::{Air, Field},
    error::AsmError,
    isa::{Opcode, Record, Register, Size},
    lexer::{Lexer, Token, TokenKind},
    span::Span,
};

/// Transforms token stream into AIR
pub struct AsmParser<'a> {
    /// Peekable iterator over tokens
    toks: Peekable<Lexer<'a>>,
    /// Used for end of file spans
    eof: Span,
    /// Assembly intermediate representation
    air: Air,
}

impl<'a> AsmParser<'a> {
    pub fn new(src: &'a str) -> Self {
        let lexer = Lexer::new(src);
        AsmParser {
            eof: lexer.eof_span(),
            toks: lexer.peekable(),
            air: Air::new(),
        }
    }

    /// Create AIR out of token stream. Labels are not resolved yet, see [`Air::backpatch`].
    pub fn parse(mut self) -> Result<Air, AsmError> {
        while let Some(tok) = self.next_tok()? {
            if tok.kind != TokenKind::Ident {
                return Err(self.unexpected("block label", Some(tok)));
            }
            self.parse_block(tok)?;
        }
        // Consume self to return AIR
        Ok(self.air)
    }

    /// `<label> : { <statement>* }`
    fn parse_block(&mut self, label: Token) -> Result<(), AsmError> {
        if label.text.parse::<Register>().is_ok() {
            return Err(AsmError::InvalidOperand {
                expected: "label",
                found: label.text.to_string(),
                span: label.span.into(),
            });
        }
        self.expect_punct(':')?;
        self.expect_punct('{')?;
        self.air.define_label(label.text, label.span)?;

        loop {
            match self.peek_tok()? {
                Some(tok) if tok.kind == TokenKind::Punct('}') => {
                    self.next_tok()?;
                    return Ok(());
                }
                // Separators carry no meaning of their own
                Some(tok) if tok.kind == TokenKind::Punct('|') => {
                    self.next_tok()?;
                }
                Some(_) => self.parse_stmt()?,
                None => return Err(self.unexpected("`}`", None)),
            }
        }
    }

    /// Process several tokens to form a single record
    fn parse_stmt(&mut self) -> Result<(), AsmError> {
        let Some(tok) = self.next_tok()? else {
            return Err(self.unexpected("instruction", None));
        };
        let record = match tok.kind {
            // <int> -> <reg> <size>
            TokenKind::Int(val) => {
                self.expect_arrow()?;
                let dest = self.expect_reg()?;
                let size = self.expect_size()?;
                Record::new(Opcode::LoadImm, size, val, dest.index() as u32)
            }
            TokenKind::Ident => match tok.text {
                "hcf" => Record::bare(Opcode::Hcf),
                "mu" => Record::bare(Opcode::Mu),
                "add" => Record::bare(Opcode::Add),
                "sub" => Record::bare(Opcode::Sub),
                "div" => Record::bare(Opcode::Div),
                "mul" => Record::bare(Opcode::Mul),
                "move" => {
                    let size = self.expect_size()?;
                    let (src, dest) = self.reg_to_reg()?;
                    Record::new(Opcode::Move, size, src, dest)
                }
                "not" => self.binary_op(Opcode::Not)?,
                "and" => self.binary_op(Opcode::And)?,
                "or" => self.binary_op(Opcode::Or)?,
                "xor" => self.binary_op(Opcode::Xor)?,
                "copy" => self.binary_op(Opcode::Copy)?,
                "load" => {
                    let size = self.expect_size()?;
                    let dest = self.expect_reg()?;
                    self.expect_punct('<')?;
                    self.expect_punct('-')?;
                    let addr = self.expect_int()?;
                    Record::new(Opcode::Load, size, addr, dest.index() as u32)
                }
                "store" => {
                    let size = self.expect_size()?;
                    let src = self.expect_reg()?;
                    self.expect_arrow()?;
                    let addr = self.expect_int()?;
                    Record::new(Opcode::Store, size, src.index() as u32, addr)
                }
                "swap" => {
                    let reg = self.expect_reg()?;
                    Record::new(Opcode::Swap, Size::Byte, 0, reg.index() as u32)
                }
                "dout" => {
                    let reg = self.expect_reg()?;
                    Record::new(Opcode::DebugOut, Size::Byte, 0, reg.index() as u32)
                }
                "exchange" => {
                    let first = self.expect_reg()?;
                    self.expect_punct('<')?;
                    self.expect_punct('-')?;
                    self.expect_punct('>')?;
                    let second = self.expect_reg()?;
                    Record::new(
                        Opcode::Exchange,
                        Size::Byte,
                        first.index() as u32,
                        second.index() as u32,
                    )
                }
                "jump" => return self.parse_jump(),
                _ => return Err(self.unexpected("instruction", Some(tok))),
            },
            TokenKind::Punct(_) => return Err(self.unexpected("instruction", Some(tok))),
        };
        self.air.add_record(record);
        Ok(())
    }

    /// `jump <label>`, `jump <reg>` or
    /// `jump to <label|reg> if <reg> is [not] equal to zero`
    fn parse_jump(&mut self) -> Result<(), AsmError> {
        let target = self.expect_ident("label")?;

        if target.text != "to" {
            match target.text.parse::<Register>() {
                Ok(reg) => self.air.add_record(Record::new(
                    Opcode::Jump,
                    Size::Byte,
                    reg.index() as u32,
                    0,
                )),
                Err(()) => self.air.add_record_patched(
                    Record::new(Opcode::Jump, Size::ConstLongword, 0, 0),
                    Field::Source,
                    target.text,
                    target.span,
                ),
            }
            return Ok(());
        }

        let target = self.expect_ident("label")?;
        self.expect_word("if")?;
        let cond = self.expect_reg()?;
        self.expect_word("is")?;
        let opcode = match self.next_tok()? {
            Some(tok) if tok.text == "not" => {
                self.expect_word("equal")?;
                Opcode::JumpNeqZero
            }
            Some(tok) if tok.text == "equal" => Opcode::JumpEqZero,
            other => return Err(self.unexpected("`equal` or `not`", other)),
        };
        self.expect_word("to")?;
        self.expect_word("zero")?;

        match target.text.parse::<Register>() {
            Ok(reg) => self.air.add_record(Record::new(
                opcode,
                Size::Byte,
                cond.index() as u32,
                reg.index() as u32,
            )),
            Err(()) => self.air.add_record_patched(
                Record::new(opcode, Size::ConstLongword, cond.index() as u32, 0),
                Field::Dest,
                target.text,
                target.span,
            ),
        }
        Ok(())
    }

    /// `<op> <reg> -> <reg>`
    fn binary_op(&mut self, opcode: Opcode) -> Result<Record, AsmError> {
        let (src, dest) = self.reg_to_reg()?;
        Ok(Record::new(opcode, Size::Byte, src, dest))
    }

    fn reg_to_reg(&mut self) -> Result<(u32, u32), AsmError> {
        let src = self.expect_reg()?;
        self.expect_arrow()?;
        let dest = self.expect_reg()?;
        Ok((src.index() as u32, dest.index() as u32))
    }

    fn next_tok(&mut self) -> Result<Option<Token<'a>>, AsmError> {
        self.toks.next().transpose()
    }

    fn peek_tok(&mut self) -> Result<Option<Token<'a>>, AsmError> {
        match self.toks.peek() {
            Some(Ok(tok)) => Ok(Some(*tok)),
            Some(Err(e)) => Err(e.clone()),
            None => Ok(None),
        }
    }

    fn unexpected(&self, expected: &str, found: Option<Token>) -> AsmError {
        match found {
            Some(tok) => AsmError::Syntax {
                expected: expected.to_string(),
                found: tok.to_string(),
                span: tok.span.into(),
            },
            None => AsmError::Syntax {
                expected: expected.to_string(),
                found: "end of file".to_string(),
                span: self.eof.into(),
            },
        }
    }

    fn expect_where(
        &mut self,
        mut check: impl FnMut(&Token) -> bool,
        expected: &str,
    ) -> Result<Token<'a>, AsmError> {
        match self.next_tok()? {
            Some(tok) if check(&tok) => Ok(tok),
            other => Err(self.unexpected(expected, other)),
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), AsmError> {
        self.expect_where(|tok| tok.kind == TokenKind::Punct(c), &format!("`{c}`"))?;
        Ok(())
    }

    fn expect_arrow(&mut self) -> Result<(), AsmError> {
        self.expect_punct('-')?;
        self.expect_punct('>')
    }

    fn expect_ident(&mut self, expected: &str) -> Result<Token<'a>, AsmError> {
        self.expect_where(|tok| tok.kind == TokenKind::Ident, expected)
    }

    /// Expect an identifier spelled exactly `word`.
    fn expect_word(&mut self, word: &str) -> Result<(), AsmError> {
        self.expect_where(
            |tok| tok.kind == TokenKind::Ident && tok.text == word,
            &format!("`{word}`"),
        )?;
        Ok(())
    }

    fn expect_int(&mut self) -> Result<u32, AsmError> {
        let tok = self.expect_where(|tok| matches!(tok.kind, TokenKind::Int(_)), "integer")?;
        match tok.kind {
            TokenKind::Int(val) => Ok(val),
            _ => unreachable!(),
        }
    }

    fn expect_reg(&mut self) -> Result<Register, AsmError> {
        let tok = self.expect_ident("register")?;
        tok.text.parse().map_err(|()| AsmError::InvalidOperand {
            expected: "register",
            found: tok.text.to_string(),
            span: tok.span.into(),
        })
    }

    fn expect_size(&mut self) -> Result<Size, AsmError> {
        let tok = self.expect_ident("size")?;
        tok.text.parse().map_err(|()| AsmError::InvalidOperand {
            expected: "size",
            found: tok.text.to_string(),
            span: tok.span.into(),
        })
    }
}

/// Assemble a complete source file into an image. Nothing is returned on error.
pub fn assemble(src: &str) -> Result<Vec<u8>, AsmError> {
    AsmParser::new(src).parse()?.emit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::RECORD_SIZE;

    fn single(src: &str) -> Record {
        let air = AsmParser::new(src).parse().unwrap();
        assert_eq!(air.len(), 1, "expected a single record for {src:?}");
        *air.get(0)
    }

    #[test]
    fn hcf_only() {
        assert_eq!(assemble("main: { hcf }").unwrap(), vec![0; RECORD_SIZE]);
    }

    #[test]
    fn empty_source() {
        assert_eq!(assemble("").unwrap(), Vec::<u8>::new());
        assert_eq!(assemble("// nothing here").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn bare_ops() {
        let image = assemble("main: { hcf mu add sub div mul }").unwrap();
        let opcodes: Vec<u8> = image.chunks(RECORD_SIZE).map(|rec| rec[0]).collect();
        assert_eq!(opcodes, vec![0x00, 0xFF, 0x01, 0x02, 0x03, 0x04]);
        assert!(image
            .chunks(RECORD_SIZE)
            .all(|rec| rec[1..].iter().all(|&b| b == 0)));
    }

    #[test]
    fn load_immediate() {
        assert_eq!(
            assemble("main: { 42 -> reg3 byte }").unwrap(),
            vec![0x05, 0x00, 0x00, 0x00, 0x00, 0x2a, 0x00, 0x00, 0x00, 0x03]
        );
        assert_eq!(
            single("main: { 0x1FF -> reg15 word }"),
            Record::new(Opcode::LoadImm, Size::Word, 0x1FF, 15)
        );
    }

    #[test]
    fn register_forms() {
        assert_eq!(
            single("main: { move longword reg1 -> reg2 }"),
            Record::new(Opcode::Move, Size::Longword, 1, 2)
        );
        assert_eq!(
            single("main: { not reg4 -> reg5 }"),
            Record::new(Opcode::Not, Size::Byte, 4, 5)
        );
        assert_eq!(
            single("main: { and reg0 -> reg1 }"),
            Record::new(Opcode::And, Size::Byte, 0, 1)
        );
        assert_eq!(
            single("main: { or reg0 -> reg1 }"),
            Record::new(Opcode::Or, Size::Byte, 0, 1)
        );
        assert_eq!(
            single("main: { xor reg0 -> reg1 }"),
            Record::new(Opcode::Xor, Size::Byte, 0, 1)
        );
        assert_eq!(
            single("main: { copy reg9 -> reg10 }"),
            Record::new(Opcode::Copy, Size::Byte, 9, 10)
        );
        assert_eq!(
            single("main: { swap reg7 }"),
            Record::new(Opcode::Swap, Size::Byte, 0, 7)
        );
        assert_eq!(
            single("main: { dout reg2 }"),
            Record::new(Opcode::DebugOut, Size::Byte, 0, 2)
        );
        assert_eq!(
            single("main: { exchange reg1 <-> reg14 }"),
            Record::new(Opcode::Exchange, Size::Byte, 1, 14)
        );
    }

    #[test]
    fn memory_forms() {
        assert_eq!(
            assemble("main: { load word reg3 <- 2097152 }").unwrap(),
            vec![0x07, 0x01, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03]
        );
        assert_eq!(
            assemble("main: { store byte reg3 -> 0x200010 }").unwrap(),
            vec![0x08, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x20, 0x00, 0x10]
        );
    }

    #[test]
    fn jump_forward() {
        let image = assemble("a: { jump b } b: { hcf }").unwrap();
        assert_eq!(image.len(), 2 * RECORD_SIZE);
        assert_eq!(&image[..2], &[0x0F, 0x05]);
        // Source field holds the offset of `b`
        assert_eq!(&image[2..6], &10u32.to_be_bytes());
        assert_eq!(&image[6..10], &[0; 4]);
    }

    #[test]
    fn jump_backward_to_self() {
        let image = assemble("pre: { mu mu } loop: { jump loop }").unwrap();
        assert_eq!(&image[22..26], &20u32.to_be_bytes());
    }

    #[test]
    fn jump_register() {
        assert_eq!(
            single("main: { jump reg6 }"),
            Record::new(Opcode::Jump, Size::Byte, 6, 0)
        );
    }

    #[test]
    fn conditional_jumps() {
        let image = assemble(
            r#"
            main: {
                jump to done if reg4 is equal to zero
                jump to done if reg5 is not equal to zero
            }
            done: { hcf }
            "#,
        )
        .unwrap();
        assert_eq!(
            &image[..10],
            &[0x10, 0x05, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 20]
        );
        assert_eq!(
            &image[10..20],
            &[0x11, 0x05, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 20]
        );
        assert_eq!(
            single("main: { jump to reg1 if reg2 is equal to zero }"),
            Record::new(Opcode::JumpEqZero, Size::Byte, 2, 1)
        );
    }

    #[test]
    fn separators_emit_nothing() {
        let plain = assemble("main: { 1 -> reg0 byte 2 -> reg1 byte add hcf }").unwrap();
        let separated =
            assemble("main: { | 1 -> reg0 byte | 2 -> reg1 byte | add | hcf }").unwrap();
        let prefixed = assemble("main: { | | 1 -> reg0 byte 2 -> reg1 byte | add hcf }").unwrap();
        assert_eq!(plain, separated);
        assert_eq!(plain, prefixed);
    }

    #[test]
    fn empty_block_shares_offset() {
        let air = AsmParser::new("a: { } b: { hcf }").parse().unwrap();
        assert_eq!(air.label_offset("a"), Some(0));
        assert_eq!(air.label_offset("b"), Some(0));
    }

    #[test]
    fn unresolved_label() {
        let err = assemble("main: { jump nowhere }").unwrap_err();
        match err {
            AsmError::UnresolvedLabel { name, span } => {
                assert_eq!(name, "nowhere");
                assert_eq!(span.offset(), 13);
            }
            other => panic!("expected unresolved label, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_label() {
        let err = assemble("a: { hcf } a: { hcf }").unwrap_err();
        assert!(matches!(err, AsmError::DuplicateLabel { .. }));
    }

    #[test]
    fn register_named_label() {
        let err = assemble("reg1: { hcf }").unwrap_err();
        assert!(matches!(err, AsmError::InvalidOperand { .. }));
    }

    #[test]
    fn invalid_operands() {
        let err = assemble("main: { copy reg16 -> reg1 }").unwrap_err();
        assert!(matches!(
            err,
            AsmError::InvalidOperand { expected: "register", .. }
        ));
        let err = assemble("main: { move quadword reg0 -> reg1 }").unwrap_err();
        assert!(matches!(err, AsmError::InvalidOperand { expected: "size", .. }));
        let err = assemble("main: { 5 -> reg0 nibble }").unwrap_err();
        assert!(matches!(err, AsmError::InvalidOperand { expected: "size", .. }));
    }

    #[test]
    fn syntax_errors() {
        let cases = [
            "main { hcf }",
            "main: hcf",
            "main: { copy reg0 - reg1 }",
            "main: { frobnicate }",
            "main: { load byte reg0 <- reg1 }",
            "main: { jump to x if reg0 is zero }",
            "main: { jump to x if reg0 is equal zero }",
            "42: { hcf }",
            "main: { -> }",
        ];
        for src in cases {
            assert!(
                matches!(assemble(src), Err(AsmError::Syntax { .. })),
                "{src:?} should be a syntax error"
            );
        }
    }

    #[test]
    fn unexpected_eof() {
        match assemble("main: { hcf").unwrap_err() {
            AsmError::Syntax {
                expected, found, ..
            } => {
                assert_eq!(expected, "`}`");
                assert_eq!(found, "end of file");
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
        assert!(matches!(
            assemble("main: { store byte reg0 ->").unwrap_err(),
            AsmError::Syntax { .. }
        ));
    }

    #[test]
    fn error_position() {
        let src = "main: {\n  hcf\n  bogus\n}";
        let err = assemble(src).unwrap_err();
        let span = err.span();
        assert_eq!(&src[span.offset()..span.offset() + span.len()], "bogus");
    }

    #[test]
    fn lexer_errors_surface() {
        assert!(matches!(
            assemble("main: { 99999999999 -> reg0 longword }"),
            Err(AsmError::InvalidLiteral { .. })
        ));
    }
}
