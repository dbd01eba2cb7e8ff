//! Precedence-aware C expression printing.

use std::fmt::Write;

use crate::ir::{Exp, ExpRewrite, Operator, SharedExp, Type, Value};
use crate::program::{Program, UserProc};

/// C operator precedence, from loosest to tightest binding.
///
/// A child is parenthesized exactly when its operator binds more loosely
/// than the slot it is printed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Prec {
    /// Statement level, no parentheses needed.
    None,
    /// Comma (argument separators).
    Comma,
    /// Assignment.
    Assign,
    /// Ternary conditional.
    Cond,
    /// `||`
    LogOr,
    /// `&&`
    LogAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `&`
    BitAnd,
    /// `==` `!=`
    Equal,
    /// `<` `<=` `>` `>=`
    Rel,
    /// `<<` `>>`
    BitShift,
    /// `+` `-`
    Add,
    /// `*` `/` `%`
    Mult,
    /// Unary operators.
    Unary,
    /// Primary expressions.
    Prim,
}

fn open_paren(out: &mut String, outer: Prec, inner: Prec) {
    if inner < outer {
        out.push('(');
    }
}

fn close_paren(out: &mut String, outer: Prec, inner: Prec) {
    if inner < outer {
        out.push(')');
    }
}

/// Escapes a string constant for a C literal.
fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Escapes a character constant.
fn escape_char(k: i64) -> String {
    match u8::try_from(k & 0xff).unwrap_or(b'?') {
        b'\x07' => "'\\a'".into(),
        b'\x08' => "'\\b'".into(),
        b'\x0c' => "'\\f'".into(),
        b'\n' => "'\\n'".into(),
        b'\r' => "'\\r'".into(),
        b'\t' => "'\\t'".into(),
        b'\x0b' => "'\\v'".into(),
        b'\\' => "'\\\\'".into(),
        b'\'' => "'\\''".into(),
        b'"' => "'\\\"'".into(),
        c if c.is_ascii_graphic() || c == b' ' => format!("'{}'", c as char),
        c => format!("'\\x{c:02x}'"),
    }
}

/// The expression printer: renders expression trees as C, consulting the
/// procedure's symbol map first.
pub struct ExpPrinter<'a> {
    prog: &'a Program,
    proc: Option<&'a UserProc>,
}

impl<'a> ExpPrinter<'a> {
    /// A printer for expressions of `proc` (global declarations pass no
    /// procedure and get no symbol substitution).
    #[must_use]
    pub fn new(prog: &'a Program, proc: Option<&'a UserProc>) -> ExpPrinter<'a> {
        ExpPrinter { prog, proc }
    }

    /// Renders `exp` into `out` at context precedence `cur`.
    ///
    /// `uns` requests unsigned rendering of integer constants, propagated
    /// down by unsigned comparisons the way the C source would read.
    pub fn append_exp(&self, out: &mut String, exp: &SharedExp, cur: Prec, uns: bool) {
        // Symbol substitution: a registered name wins over the structural
        // form (casts keep their structure so the cast stays visible)
        if let Some(proc) = self.proc {
            if !matches!(&**exp, Exp::Typed(_, _)) {
                let stripped = exp.strip_subscripts();
                if let Some(sym) = proc.lookup_sym(&stripped) {
                    out.push_str(sym);
                    return;
                }
            }
        }

        match &**exp {
            Exp::Subscript(base, _) => self.append_exp(out, base, cur, uns),
            Exp::Const(value) => self.append_const(out, value, uns),
            Exp::Terminal(op) => self.append_terminal(out, *op),
            Exp::Typed(ty, sub) => self.append_cast(out, ty, sub, cur),
            Exp::Unary(op, sub) => self.append_unary(out, *op, sub, cur),
            Exp::Binary(op, lhs, rhs) => self.append_binary(out, *op, lhs, rhs, cur, uns),
            Exp::Ternary(op, a, b, c) => self.append_ternary(out, *op, a, b, c, cur),
        }
    }

    fn append_const(&self, out: &mut String, value: &Value, uns: bool) {
        match value {
            Value::Int(k) => {
                let k = *k;
                if uns && k < 0 {
                    // An unsigned constant; pick the more readable rendering
                    let as_u = k as u32;
                    let rem = as_u % 100;
                    if rem == 0 || rem == 99 || k > -128 {
                        let _ = write!(out, "{as_u}U");
                    } else {
                        let _ = write!(out, "{as_u:#x}");
                    }
                } else if (-2048..2048).contains(&k) {
                    let _ = write!(out, "{k}");
                } else {
                    let _ = write!(out, "{:#x}", k as u32);
                }
            }
            Value::Long(v) => {
                if *v > 1000 || (*v as i64) < -1000 {
                    let _ = write!(out, "{v:#x}LL");
                } else {
                    let _ = write!(out, "{v}LL");
                }
            }
            Value::Float(v) => {
                let mut text = format!("{v}");
                if !text.contains('.') && !text.contains('e') && !text.contains("inf")
                    && !text.contains("NaN")
                {
                    text.push('.');
                }
                out.push_str(&text);
            }
            Value::Str(s) => {
                let _ = write!(out, "\"{}\"", escape_str(s));
            }
            Value::Addr(a) => {
                let _ = write!(out, "{:#x}", a.value());
            }
            Value::Func(name) => out.push_str(name),
        }
    }

    fn append_terminal(&self, out: &mut String, op: Operator) {
        match op {
            Operator::Flags => out.push_str("flags"),
            Operator::Fflags => out.push_str("fflags"),
            Operator::Pc => out.push_str("pc"),
            Operator::True => out.push_str("1"),
            Operator::False => out.push_str("0"),
            Operator::Nil => {}
            // Individual machine flags occasionally survive to the back end
            Operator::ZF | Operator::CF | Operator::NF | Operator::OF | Operator::DF
            | Operator::FZF | Operator::FLF | Operator::FGF => {
                out.push_str(&op.as_ref().to_lowercase());
            }
            other => {
                log::warn!("terminal {} not implemented in the back end", other.as_ref());
                let _ = write!(out, "/* {} */", other.as_ref());
            }
        }
    }

    fn append_cast(&self, out: &mut String, ty: &Type, sub: &SharedExp, cur: Prec) {
        // Character constants print as escaped chars, not numbers
        if ty.is_char() {
            if let Some(k) = sub.int_value() {
                out.push_str(&escape_char(k));
                return;
            }
        }
        // (T)(T)x collapses
        if let Exp::Typed(inner_ty, _) = &**sub {
            if inner_ty == ty {
                self.append_exp(out, sub, cur, false);
                return;
            }
        }
        // (T)m[x] reads as *(T*)x
        if let Exp::Unary(Operator::MemOf, addr) = &**sub {
            out.push_str("*(");
            super::ctype::append_type(out, ty);
            out.push_str("*)");
            open_paren(out, cur, Prec::Unary);
            self.append_exp(out, addr, Prec::Unary, false);
            close_paren(out, cur, Prec::Unary);
            return;
        }
        out.push('(');
        super::ctype::append_type(out, ty);
        out.push(')');
        open_paren(out, cur, Prec::Unary);
        self.append_exp(out, sub, Prec::Unary, false);
        close_paren(out, cur, Prec::Unary);
    }

    fn append_unary(&self, out: &mut String, op: Operator, sub: &SharedExp, cur: Prec) {
        match op {
            Operator::RegOf => match sub.int_value() {
                Some(r) => {
                    let _ = write!(out, "{}", self.prog.reg_name(r as u16));
                }
                None => {
                    out.push_str("r[");
                    self.append_exp(out, sub, Prec::None, false);
                    out.push(']');
                }
            },
            Operator::MemOf => {
                open_paren(out, cur, Prec::Unary);
                out.push('*');
                self.append_exp(out, sub, Prec::Unary, false);
                close_paren(out, cur, Prec::Unary);
            }
            Operator::AddrOf => {
                // Arrays and string pointers decay; the & is suppressed
                if let Exp::Unary(Operator::Global, name) = &**sub {
                    if let Exp::Const(Value::Str(name)) = &**name {
                        let is_decayed = self.prog.global_type(name).is_some_and(|t| {
                            t.resolves_to_array()
                                || t.pointee().is_some_and(Type::is_char)
                        });
                        if is_decayed {
                            self.append_exp(out, sub, cur, false);
                            return;
                        }
                    }
                }
                if let Exp::Unary(Operator::MemOf, addr) = &**sub {
                    // &*x is x
                    self.append_exp(out, addr, Prec::Unary, false);
                    return;
                }
                open_paren(out, cur, Prec::Unary);
                out.push('&');
                self.append_exp(out, sub, Prec::Unary, false);
                close_paren(out, cur, Prec::Unary);
            }
            Operator::Param | Operator::Local | Operator::Global | Operator::Temp => {
                match &**sub {
                    Exp::Const(Value::Str(name)) => out.push_str(name),
                    other => {
                        let _ = write!(out, "{other}");
                    }
                }
            }
            Operator::Neg | Operator::FNeg => {
                open_paren(out, cur, Prec::Unary);
                out.push('-');
                self.append_exp(out, sub, Prec::Unary, false);
                close_paren(out, cur, Prec::Unary);
            }
            Operator::Not => {
                open_paren(out, cur, Prec::Unary);
                out.push('~');
                self.append_exp(out, sub, Prec::Unary, false);
                close_paren(out, cur, Prec::Unary);
            }
            Operator::LNot => {
                open_paren(out, cur, Prec::Unary);
                out.push('!');
                self.append_exp(out, sub, Prec::Unary, false);
                close_paren(out, cur, Prec::Unary);
            }
            Operator::Fabs => self.append_call1(out, "fabs", sub),
            Operator::Fround => self.append_call1(out, "round", sub),
            Operator::Ftrunc => self.append_call1(out, "trunc", sub),
            Operator::Sin => self.append_call1(out, "sin", sub),
            Operator::Cos => self.append_call1(out, "cos", sub),
            Operator::Tan => self.append_call1(out, "tan", sub),
            Operator::ArcTan => self.append_call1(out, "atan", sub),
            Operator::Log2 => self.append_call1(out, "log2", sub),
            Operator::Log10 => self.append_call1(out, "log10", sub),
            Operator::LogE => self.append_call1(out, "log", sub),
            Operator::Sqrt | Operator::SqrtS | Operator::SqrtD | Operator::SqrtQ => {
                self.append_call1(out, "sqrt", sub);
            }
            Operator::RotateL => self.append_call1(out, "ROTL", sub),
            Operator::RotateR => self.append_call1(out, "ROTR", sub),
            Operator::RotateLC => self.append_call1(out, "ROTLC", sub),
            Operator::RotateRC => self.append_call1(out, "ROTRC", sub),
            other => {
                log::warn!("unary {} not implemented in the back end", other.as_ref());
                self.append_exp(out, sub, cur, false);
            }
        }
    }

    fn append_call1(&self, out: &mut String, name: &str, sub: &SharedExp) {
        out.push_str(name);
        out.push('(');
        self.append_exp(out, sub, Prec::None, false);
        out.push(')');
    }

    #[allow(clippy::too_many_lines)]
    fn append_binary(
        &self,
        out: &mut String,
        op: Operator,
        lhs: &SharedExp,
        rhs: &SharedExp,
        cur: Prec,
        uns: bool,
    ) {
        // Infix operators share one shape: prec, symbol, child signedness
        let (prec, symbol, child_uns) = match op {
            Operator::Plus | Operator::FPlus | Operator::FPlusD | Operator::FPlusQ => {
                (Prec::Add, " + ", uns)
            }
            Operator::Minus | Operator::FMinus | Operator::FMinusD | Operator::FMinusQ => {
                (Prec::Add, " - ", uns)
            }
            Operator::Mult | Operator::Mults | Operator::FMult | Operator::FMultD
            | Operator::FMultQ | Operator::FMultSD | Operator::FMultDQ => {
                (Prec::Mult, " * ", uns)
            }
            Operator::Div | Operator::Divs | Operator::FDiv | Operator::FDivD
            | Operator::FDivQ => (Prec::Mult, " / ", uns),
            Operator::Mod | Operator::Mods => (Prec::Mult, " % ", uns),
            Operator::ShiftL => (Prec::BitShift, " << ", uns),
            Operator::ShiftR | Operator::ShiftRA => (Prec::BitShift, " >> ", uns),
            Operator::BitOr => (Prec::BitOr, " | ", uns),
            Operator::BitXor => (Prec::BitXor, " ^ ", uns),
            Operator::And => (Prec::LogAnd, " && ", false),
            Operator::Or => (Prec::LogOr, " || ", false),
            Operator::Equals => (Prec::Equal, " == ", false),
            Operator::NotEqual => (Prec::Equal, " != ", false),
            Operator::Less => (Prec::Rel, " < ", false),
            Operator::Gtr => (Prec::Rel, " > ", false),
            Operator::LessEq => (Prec::Rel, " <= ", false),
            Operator::GtrEq => (Prec::Rel, " >= ", false),
            Operator::LessUns => (Prec::Rel, " < ", true),
            Operator::GtrUns => (Prec::Rel, " > ", true),
            Operator::LessEqUns => (Prec::Rel, " <= ", true),
            Operator::GtrEqUns => (Prec::Rel, " >= ", true),
            Operator::BitAnd => {
                open_paren(out, cur, Prec::BitAnd);
                self.append_exp(out, lhs, Prec::BitAnd, uns);
                out.push_str(" & ");
                if let Some(k) = rhs.int_value() {
                    // Masks read best in hex; use the negated form when it
                    // is shorter
                    let val = k as u32;
                    let vanilla = format!("{val:#x}");
                    let negated = format!("~{:#x}", !val);
                    if negated.len() < vanilla.len() {
                        out.push_str(&negated);
                    } else {
                        out.push_str(&vanilla);
                    }
                } else {
                    self.append_exp(out, rhs, Prec::BitAnd, uns);
                }
                close_paren(out, cur, Prec::BitAnd);
                return;
            }
            Operator::ArrayIndex => {
                open_paren(out, cur, Prec::Prim);
                self.append_exp(out, lhs, Prec::Prim, false);
                close_paren(out, cur, Prec::Prim);
                out.push('[');
                self.append_exp(out, rhs, Prec::None, false);
                out.push(']');
                return;
            }
            Operator::MemberAccess => {
                if let Exp::Unary(Operator::MemOf, base) = &**lhs {
                    self.append_exp(out, base, Prec::Prim, false);
                    out.push_str("->");
                } else {
                    self.append_exp(out, lhs, Prec::Prim, false);
                    out.push('.');
                }
                match &**rhs {
                    Exp::Const(Value::Str(field)) => out.push_str(field),
                    other => {
                        log::warn!("member access without a field name: {other}");
                        out.push_str("field");
                    }
                }
                return;
            }
            Operator::FlagCall => {
                if let Exp::Const(Value::Str(name)) = &**lhs {
                    out.push_str(name);
                }
                out.push('(');
                let mut item = rhs.clone();
                let mut first = true;
                while let Exp::Binary(Operator::List, head, tail) = &*item.clone() {
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    self.append_exp(out, head, Prec::None, false);
                    item = tail.clone();
                }
                out.push(')');
                return;
            }
            Operator::List => {
                out.push_str("{ ");
                let mut item = exp_clone(lhs, rhs);
                let mut on_line = 0;
                loop {
                    let current = item.clone();
                    let Exp::Binary(Operator::List, head, tail) = &*current else {
                        break;
                    };
                    self.append_exp(out, head, Prec::None, uns);
                    on_line += 1;
                    if tail.is_nil() {
                        break;
                    }
                    if on_line >= 16 {
                        out.push_str(",\n ");
                        on_line = 0;
                    } else {
                        out.push_str(", ");
                    }
                    item = tail.clone();
                }
                out.push_str(" }");
                return;
            }
            Operator::Pow => {
                out.push_str("pow(");
                self.append_exp(out, lhs, Prec::Comma, false);
                out.push_str(", ");
                self.append_exp(out, rhs, Prec::Comma, false);
                out.push(')');
                return;
            }
            Operator::Size => {
                // Size annotation: print the underlying expression
                self.append_exp(out, rhs, cur, uns);
                return;
            }
            other => {
                log::warn!("binary {} not implemented in the back end", other.as_ref());
                (Prec::None, " ?? ", false)
            }
        };

        open_paren(out, cur, prec);
        self.append_exp(out, lhs, prec, child_uns);
        out.push_str(symbol);
        self.append_exp(out, rhs, prec, child_uns);
        close_paren(out, cur, prec);
    }

    fn append_ternary(
        &self,
        out: &mut String,
        op: Operator,
        a: &SharedExp,
        b: &SharedExp,
        c: &SharedExp,
        cur: Prec,
    ) {
        match op {
            Operator::Tern => {
                open_paren(out, cur, Prec::Cond);
                out.push('(');
                self.append_exp(out, a, Prec::None, false);
                out.push_str(") ? ");
                self.append_exp(out, b, Prec::Cond, false);
                out.push_str(" : ");
                self.append_exp(out, c, Prec::Cond, false);
                close_paren(out, cur, Prec::Cond);
            }
            Operator::At => {
                // Bitfield read: (x >> low) & mask
                open_paren(out, cur, Prec::BitAnd);
                self.append_exp(out, a, Prec::BitShift, false);
                out.push_str(" >> ");
                self.append_exp(out, c, Prec::BitShift, false);
                out.push_str(" & ");
                match (b.int_value(), c.int_value()) {
                    (Some(n), Some(m)) if n >= m && n - m < 63 => {
                        let mask = (1u64 << (n - m + 1)) - 1;
                        if mask < 10 {
                            let _ = write!(out, "{mask}");
                        } else {
                            let _ = write!(out, "{mask:#x}");
                        }
                    }
                    _ => out.push_str("/* bitfield bounds */ 0"),
                }
                close_paren(out, cur, Prec::BitAnd);
            }
            Operator::SgnEx | Operator::TruncS => {
                match c.int_value().or_else(|| b.int_value()) {
                    Some(8) => out.push_str("(char) "),
                    Some(16) => out.push_str("(short) "),
                    Some(64) => out.push_str("(long long) "),
                    _ => out.push_str("(int) "),
                }
                self.append_exp(out, a, cur, false);
            }
            Operator::TruncU | Operator::Zfill => {
                match c.int_value().or_else(|| b.int_value()) {
                    Some(8) => out.push_str("(unsigned char) "),
                    Some(16) => out.push_str("(unsigned short) "),
                    Some(64) => out.push_str("(unsigned long long) "),
                    _ => out.push_str("(unsigned int) "),
                }
                self.append_exp(out, a, cur, false);
            }
            Operator::Itof => {
                out.push_str("(float)");
                open_paren(out, cur, Prec::Unary);
                self.append_exp(out, a, Prec::Unary, false);
                close_paren(out, cur, Prec::Unary);
            }
            Operator::Ftoi => {
                out.push_str("(int)");
                open_paren(out, cur, Prec::Unary);
                self.append_exp(out, a, Prec::Unary, false);
                close_paren(out, cur, Prec::Unary);
            }
            Operator::Fsize => {
                if a.is_mem_of() {
                    match b.int_value() {
                        Some(64) => out.push_str("*((double *)&"),
                        Some(80) => out.push_str("*((long double *)&"),
                        _ => out.push_str("*((float *)&"),
                    }
                    self.append_exp(out, a, Prec::Unary, false);
                    out.push(')');
                } else {
                    self.append_exp(out, a, cur, false);
                }
            }
            other => {
                log::warn!("ternary {} not implemented in the back end", other.as_ref());
                self.append_exp(out, a, cur, false);
            }
        }
    }
}

/// Rebuilds the list node the caller destructured, for the list walker.
fn exp_clone(lhs: &SharedExp, rhs: &SharedExp) -> SharedExp {
    Exp::binary(Operator::List, lhs.clone(), rhs.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Address;
    use crate::program::{Program, UserProc};
    use crate::project::{BinaryImage, Section};

    struct NullImage;

    impl BinaryImage for NullImage {
        fn read_native1(&self, _addr: Address) -> Option<u8> {
            None
        }
        fn read_native4(&self, _addr: Address) -> Option<u32> {
            None
        }
        fn section_by_addr(&self, _addr: Address) -> Option<Section> {
            None
        }
        fn entry_points(&self) -> Vec<Address> {
            Vec::new()
        }
        fn symbol_at(&self, _addr: Address) -> Option<String> {
            None
        }
    }

    fn render(exp: &SharedExp, uns: bool) -> String {
        let prog = Program::new("t", Box::new(NullImage));
        let proc = UserProc::new("p", Address(0x1000), 0);
        let printer = ExpPrinter::new(&prog, Some(&proc));
        let mut out = String::new();
        printer.append_exp(&mut out, exp, Prec::None, uns);
        out
    }

    /// Parses an emitted integer literal back to its value.
    fn parse_literal(text: &str) -> i64 {
        if let Some(hex) = text.strip_prefix("0x") {
            return i64::from(u32::from_str_radix(hex, 16).unwrap() as i32);
        }
        if let Some(dec) = text.strip_suffix('U') {
            return i64::from(dec.parse::<u32>().unwrap() as i32);
        }
        text.parse::<i64>().unwrap()
    }

    #[test]
    fn test_integer_literal_round_trip() {
        for k in [
            0i64,
            1,
            -1,
            42,
            2047,
            2048,
            -2047,
            -2048,
            0x7fff_ffff,
            -0x8000_0000,
            1000,
            -4096,
        ] {
            for uns in [false, true] {
                let text = render(&Exp::int(k), uns);
                assert_eq!(parse_literal(&text), k, "literal {text} for {k}");
            }
        }
    }

    #[test]
    fn test_small_constants_print_decimal_large_print_hex() {
        assert_eq!(render(&Exp::int(42), false), "42");
        assert_eq!(render(&Exp::int(-7), false), "-7");
        assert_eq!(render(&Exp::int(0x2000), false), "0x2000");
    }

    #[test]
    fn test_precedence_parentheses() {
        // (a + b) * c keeps its parens; a + b * c needs none
        let a = Exp::reg(24);
        let b = Exp::reg(25);
        let c = Exp::reg(26);
        let sum_first = Exp::binary(
            Operator::Mult,
            Exp::binary(Operator::Plus, a.clone(), b.clone()),
            c.clone(),
        );
        assert_eq!(render(&sum_first, false), "(r24 + r25) * r26");

        let mult_first = Exp::binary(
            Operator::Plus,
            a.clone(),
            Exp::binary(Operator::Mult, b, c),
        );
        assert_eq!(render(&mult_first, false), "r24 + r25 * r26");
    }

    #[test]
    fn test_shift_in_additive_context_parenthesized() {
        // x >> 4 under + binds looser in C and needs parens
        let e = Exp::binary(
            Operator::Plus,
            Exp::reg(24),
            Exp::binary(Operator::ShiftR, Exp::reg(25), Exp::int(4)),
        );
        assert_eq!(render(&e, false), "r24 + (r25 >> 4)");
    }

    #[test]
    fn test_unsigned_comparison_renders_operands_unsigned() {
        let e = Exp::binary(Operator::LessUns, Exp::reg(24), Exp::int(-100));
        assert_eq!(render(&e, false), "r24 < 4294967196U");
    }

    #[test]
    fn test_char_constant_escapes() {
        let ch = |k: i64| {
            Exp::typed(
                Type::Integer {
                    size: 8,
                    sign: crate::ir::Sign::Signed,
                },
                Exp::int(k),
            )
        };
        assert_eq!(render(&ch(65), false), "'A'");
        assert_eq!(render(&ch(10), false), "'\\n'");
        assert_eq!(render(&ch(9), false), "'\\t'");
        assert_eq!(render(&ch(39), false), "'\\''");
    }

    #[test]
    fn test_memof_and_subscript() {
        let e = Exp::mem_of(Exp::binary(Operator::Minus, Exp::reg(28), Exp::int(4)));
        assert_eq!(render(&e, false), "*(r28 - 4)");

        // Subscripts never reach the output
        let s = Exp::subscript(Exp::reg(24), Some(crate::ir::StatementId(7)));
        assert_eq!(render(&s, false), "r24");
    }

    #[test]
    fn test_negated_mask_when_shorter() {
        let e = Exp::binary(Operator::BitAnd, Exp::reg(24), Exp::int(-256));
        assert_eq!(render(&e, false), "r24 & ~0xff");
        let e = Exp::binary(Operator::BitAnd, Exp::reg(24), Exp::int(0xf0));
        assert_eq!(render(&e, false), "r24 & 0xf0");
    }

    #[test]
    fn test_bitfield_read_renders_shift_and_mask() {
        let e = Exp::ternary(Operator::At, Exp::reg(24), Exp::int(11), Exp::int(8));
        assert_eq!(render(&e, false), "r24 >> 8 & 0xf");
    }

    #[test]
    fn test_float_constants_keep_a_decimal_point() {
        assert_eq!(render(&Exp::flt(1.0), false), "1.");
        assert_eq!(render(&Exp::flt(0.5), false), "0.5");
    }

    #[test]
    fn test_ternary() {
        let e = Exp::ternary(
            Operator::Tern,
            Exp::binary(Operator::Less, Exp::reg(24), Exp::int(0)),
            Exp::int(1),
            Exp::int(2),
        );
        assert_eq!(render(&e, false), "(r24 < 0) ? 1 : 2");
    }
}
