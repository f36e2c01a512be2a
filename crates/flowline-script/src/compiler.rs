//! Script compiler.
//!
//! Compilation never fails: every source line either becomes a real
//! instruction, or an [`Instruction::Unknown`] no-op with a warning
//! attached. Blank lines and `//` comments occupy no instruction slot and
//! are not valid jump targets.

use crate::instruction::*;
use crate::lexer::{lex_line, Token};

/// Compile script text into a flat instruction list.
pub fn compile(source: &str) -> CompiledScript {
    let mut script = CompiledScript::default();

    for (idx, raw) in source.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        let indent = indent_width(raw);

        if trimmed == "force execution" {
            script.force_execution = true;
            continue;
        }

        let instr = match lex_line(trimmed) {
            Ok(tokens) => match parse_line(&tokens) {
                Ok(instr) => instr,
                Err(msg) => {
                    script.warnings.push(CompileWarning {
                        line_no,
                        message: format!("{msg}: `{trimmed}`"),
                    });
                    Instruction::Unknown {
                        line: trimmed.to_string(),
                    }
                }
            },
            Err(e) => {
                script.warnings.push(CompileWarning {
                    line_no,
                    message: e.to_string(),
                });
                Instruction::Unknown {
                    line: trimmed.to_string(),
                }
            }
        };

        script.lines.push(CompiledLine {
            instr,
            line_no,
            indent,
        });
    }

    resolve_branches(&mut script);
    resolve_jumps(&mut script);
    script
}

/// Indent width in columns, tabs counting as 4.
fn indent_width(raw: &str) -> usize {
    let mut width = 0;
    for c in raw.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += 4,
            _ => break,
        }
    }
    width
}

/// Point each branch at the first instruction past its body (first
/// subsequent line at or below its own indent).
fn resolve_branches(script: &mut CompiledScript) {
    let ends: Vec<Option<usize>> = script
        .lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if matches!(line.instr, Instruction::Branch { .. }) {
                let indent = line.indent;
                Some(
                    script.lines[i + 1..]
                        .iter()
                        .position(|l| l.indent <= indent)
                        .map(|off| i + 1 + off)
                        .unwrap_or(script.lines.len()),
                )
            } else {
                None
            }
        })
        .collect();

    for (line, end) in script.lines.iter_mut().zip(ends) {
        if let (Instruction::Branch { skip_to, .. }, Some(end)) = (&mut line.instr, end) {
            *skip_to = end;
        }
    }
}

/// Resolve `jump to <n>` source lines to instruction indices.
fn resolve_jumps(script: &mut CompiledScript) {
    let warnings: Vec<CompileWarning> = script
        .lines
        .iter()
        .filter_map(|l| match &l.instr {
            Instruction::Jump { line, target: None } if script.index_of_line(*line).is_none() => {
                Some(CompileWarning {
                    line_no: l.line_no,
                    message: format!("jump target line {line} is not an instruction"),
                })
            }
            _ => None,
        })
        .collect();

    let index: Vec<(usize, usize)> = script
        .lines
        .iter()
        .enumerate()
        .map(|(i, l)| (l.line_no, i))
        .collect();

    for line in &mut script.lines {
        if let Instruction::Jump { line: src, target } = &mut line.instr {
            *target = index.iter().find(|(no, _)| no == src).map(|(_, i)| *i);
        }
    }
    script.warnings.extend(warnings);
}

// === Line parser ===

type ParseResult = Result<Instruction, String>;

struct LineParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

fn parse_line(tokens: &[Token]) -> ParseResult {
    let mut p = LineParser { tokens, pos: 0 };
    let instr = p.instruction()?;
    if !p.at_end() {
        return Err("trailing tokens".to_string());
    }
    Ok(instr)
}

impl<'a> LineParser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Token, what: &str) -> Result<(), String> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(format!("expected {what}"))
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn instruction(&mut self) -> ParseResult {
        match self.peek() {
            Some(Token::Delay) => {
                self.pos += 1;
                let spec = self.delay_spec()?;
                Ok(Instruction::Delay { spec })
            }
            Some(Token::Wait) => {
                self.pos += 1;
                let cond = self.condition_expr()?;
                Ok(Instruction::Wait { cond })
            }
            Some(Token::If) => {
                self.pos += 1;
                let cond = self.condition_expr()?;
                Ok(Instruction::Branch {
                    kind: BranchKind::If,
                    cond: Some(cond),
                    skip_to: 0,
                })
            }
            Some(Token::Elif) => {
                self.pos += 1;
                let cond = self.condition_expr()?;
                Ok(Instruction::Branch {
                    kind: BranchKind::Elif,
                    cond: Some(cond),
                    skip_to: 0,
                })
            }
            Some(Token::Else) => {
                self.pos += 1;
                Ok(Instruction::Branch {
                    kind: BranchKind::Else,
                    cond: None,
                    skip_to: 0,
                })
            }
            Some(Token::Jump) => {
                self.pos += 1;
                self.expect(&Token::To, "`to` after `jump`")?;
                let line = self.integer()? as usize;
                Ok(Instruction::Jump { line, target: None })
            }
            Some(Token::Go) => self.go(),
            Some(Token::Int) => self.int_assign(),
            Some(Token::Product) => self.product(),
            Some(Token::Log) => {
                self.pos += 1;
                match self.next() {
                    Some(Token::String(s)) => Ok(Instruction::Log {
                        template: s.clone(),
                    }),
                    _ => Err("expected quoted message after `log`".to_string()),
                }
            }
            Some(Token::Create) => {
                self.pos += 1;
                self.expect(&Token::Product, "`product` after `create`")?;
                Ok(Instruction::CreateProduct)
            }
            Some(Token::Dispose) => {
                self.pos += 1;
                self.expect(&Token::Product, "`product` after `dispose`")?;
                Ok(Instruction::DisposeProduct)
            }
            Some(Token::Execute) => {
                self.pos += 1;
                let block = self.name().ok_or("expected block name after `execute`")?;
                Ok(Instruction::Execute { block })
            }
            Some(Token::Ident(_)) => self.assignment_or_status(),
            _ => Err("unknown command".to_string()),
        }
    }

    /// `<name> = true|false` or `<block>.status = "<text>"`.
    fn assignment_or_status(&mut self) -> ParseResult {
        let name = self.name().ok_or("expected name")?;
        if self.eat(&Token::Dot) {
            self.expect(&Token::Status, "`status` after `.`")?;
            self.expect(&Token::Eq, "`=` in status assignment")?;
            match self.next() {
                Some(Token::String(s)) => Ok(Instruction::BlockStatus {
                    block: name,
                    status: s.clone(),
                }),
                _ => Err("expected quoted status text".to_string()),
            }
        } else {
            self.expect(&Token::Eq, "`=` in signal assignment")?;
            let value = self.bool_literal()?;
            Ok(Instruction::SignalSet { name, value })
        }
    }

    /// `go <connector> to <target>[(<idx>[,<delay>])]`
    fn go(&mut self) -> ParseResult {
        self.pos += 1;
        let connector = match self.next() {
            Some(Token::Ident(s)) => s.clone(),
            _ => return Err("expected connector name after `go`".to_string()),
        };
        self.expect(&Token::To, "`to` in `go`")?;
        let target = self.name().ok_or("expected target block name")?;
        let mut entity_index = 0;
        let mut delay = None;
        if self.eat(&Token::LParen) {
            entity_index = self.integer()? as usize;
            if self.eat(&Token::Comma) {
                delay = Some(DelaySpec::Fixed(self.number()?));
            }
            self.expect(&Token::RParen, "`)` closing `go` arguments")?;
        }
        Ok(Instruction::Go {
            connector,
            target,
            entity_index,
            delay,
        })
    }

    /// `int <name> <op> <literal|name>`
    fn int_assign(&mut self) -> ParseResult {
        self.pos += 1;
        let name = self.name().ok_or("expected variable name after `int`")?;
        let op = match self.next() {
            Some(Token::Eq) => ArithOp::Assign,
            Some(Token::PlusEq) => ArithOp::Add,
            Some(Token::MinusEq) => ArithOp::Sub,
            Some(Token::StarEq) => ArithOp::Mul,
            Some(Token::SlashEq) => ArithOp::Div,
            _ => return Err("expected assignment operator".to_string()),
        };
        let operand = self.operand()?;
        Ok(Instruction::IntAssign { name, op, operand })
    }

    /// The `product type` family.
    fn product(&mut self) -> ParseResult {
        self.pos += 1;
        self.expect(&Token::Type, "`type` after `product`")?;
        match self.next() {
            Some(Token::PlusEq) => {
                let (attrs, color) = self.attr_list(true)?;
                Ok(Instruction::AttrAdd { attrs, color })
            }
            Some(Token::MinusEq) => {
                let (attrs, _) = self.attr_list(false)?;
                Ok(Instruction::AttrRemove { attrs })
            }
            Some(Token::LParen) => {
                let index = self.integer()? as usize;
                self.expect(&Token::RParen, "`)` after attribute index")?;
                self.expect(&Token::Eq, "`=` in attribute assignment")?;
                let value = self.attr_value().ok_or("expected attribute value")?;
                Ok(Instruction::AttrSet { index, value })
            }
            _ => Err("expected `+=`, `-=` or `(index)` after `product type`".to_string()),
        }
    }

    /// Comma-separated attribute names, with an optional trailing `(color)`
    /// when `allow_color` is set.
    fn attr_list(&mut self, allow_color: bool) -> Result<(Vec<String>, Option<String>), String> {
        let mut attrs = Vec::new();
        let mut color = None;
        loop {
            match self.attr_value() {
                Some(attr) => attrs.push(attr),
                None => return Err("expected attribute name".to_string()),
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        if allow_color && self.eat(&Token::LParen) {
            color = Some(self.name().ok_or("expected color name")?);
            self.expect(&Token::RParen, "`)` after color")?;
        }
        Ok((attrs, color))
    }

    /// A single attribute word or quoted string.
    fn attr_value(&mut self) -> Option<String> {
        match self.peek() {
            Some(Token::Ident(_)) => self.name(),
            Some(Token::String(s)) => {
                self.pos += 1;
                Some(s.clone())
            }
            _ => None,
        }
    }

    /// Condition chain: atoms joined by `and`/`or`, evaluated left to right.
    fn condition_expr(&mut self) -> Result<ConditionExpr, String> {
        let first = self.condition_atom()?;
        let mut rest = Vec::new();
        loop {
            let conn = match self.peek() {
                Some(Token::And) => Connective::And,
                Some(Token::Or) => Connective::Or,
                _ => break,
            };
            self.pos += 1;
            rest.push((conn, self.condition_atom()?));
        }
        Ok(ConditionExpr { first, rest })
    }

    fn condition_atom(&mut self) -> Result<Condition, String> {
        // product type(i) = value / != value
        if self.eat(&Token::Product) {
            self.expect(&Token::Type, "`type` after `product`")?;
            self.expect(&Token::LParen, "`(` after `product type`")?;
            let index = self.integer()? as usize;
            self.expect(&Token::RParen, "`)` after attribute index")?;
            let negated = match self.next() {
                Some(Token::Eq) => false,
                Some(Token::NotEq) => true,
                _ => return Err("expected `=` or `!=` in attribute check".to_string()),
            };
            let value = self.attr_value().ok_or("expected attribute value")?;
            return Ok(Condition::AttrCheck {
                index,
                value,
                negated,
            });
        }

        // Optional `int` prefix before a comparison is tolerated.
        self.eat(&Token::Int);
        let name = self.name().ok_or("expected name in condition")?;
        let op_tok = self.next().cloned();
        match op_tok {
            Some(Token::Eq) | Some(Token::NotEq) => {
                let negated = op_tok == Some(Token::NotEq);
                match self.peek() {
                    Some(Token::True) => {
                        self.pos += 1;
                        Ok(Condition::SignalEq {
                            name,
                            value: !negated,
                        })
                    }
                    Some(Token::False) => {
                        self.pos += 1;
                        Ok(Condition::SignalEq {
                            name,
                            value: negated,
                        })
                    }
                    _ => {
                        let operand = self.operand()?;
                        let op = if negated { CmpOp::Ne } else { CmpOp::Eq };
                        Ok(Condition::IntCmp { name, op, operand })
                    }
                }
            }
            Some(Token::Greater) => self.int_cmp(name, CmpOp::Gt),
            Some(Token::GreaterEq) => self.int_cmp(name, CmpOp::Ge),
            Some(Token::Less) => self.int_cmp(name, CmpOp::Lt),
            Some(Token::LessEq) => self.int_cmp(name, CmpOp::Le),
            _ => Err("expected comparison operator in condition".to_string()),
        }
    }

    fn int_cmp(&mut self, name: String, op: CmpOp) -> Result<Condition, String> {
        let operand = self.operand()?;
        Ok(Condition::IntCmp { name, op, operand })
    }

    /// Integer literal (optionally negative) or a variable name.
    fn operand(&mut self) -> Result<Operand, String> {
        match self.peek() {
            Some(Token::Integer(n)) => {
                self.pos += 1;
                Ok(Operand::Literal(*n))
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Operand::Literal(-self.integer()?))
            }
            Some(Token::Ident(_)) => Ok(Operand::Variable(
                self.name().ok_or("expected operand")?,
            )),
            _ => Err("expected integer or variable name".to_string()),
        }
    }

    /// `<n>` or `<lo>-<hi>`, integers or floats.
    fn delay_spec(&mut self) -> Result<DelaySpec, String> {
        let lo = self.number()?;
        if self.eat(&Token::Minus) {
            let hi = self.number()?;
            if hi < lo {
                return Err("delay range upper bound below lower bound".to_string());
            }
            Ok(DelaySpec::Range(lo, hi))
        } else {
            Ok(DelaySpec::Fixed(lo))
        }
    }

    fn number(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Integer(n)) => Ok(*n as f64),
            Some(Token::Float(f)) => Ok(*f),
            _ => Err("expected a number".to_string()),
        }
    }

    fn integer(&mut self) -> Result<i64, String> {
        match self.next() {
            Some(Token::Integer(n)) => Ok(*n),
            _ => Err("expected an integer".to_string()),
        }
    }

    fn bool_literal(&mut self) -> Result<bool, String> {
        match self.next() {
            Some(Token::True) => Ok(true),
            Some(Token::False) => Ok(false),
            _ => Err("expected `true` or `false`".to_string()),
        }
    }

    /// Coalesce consecutive identifier and number tokens into one
    /// space-joined name, so free-form signal names like
    /// `station 1 load enable` parse. A name must start with a word;
    /// a leading number is always a literal, never a name.
    fn name(&mut self) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Ident(s)) => parts.push(s.clone()),
                Some(Token::Integer(n)) if !parts.is_empty() => parts.push(n.to_string()),
                _ => break,
            }
            self.pos += 1;
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}
