//! Typesetting for `$…$` / `$$…$$` math.
//!
//! A small LaTeX subset is turned into a flat list of [`MathRun`]s: text in
//! one face at one scale and baseline shift. Latin letters are italic,
//! digits and operators roman, Greek letters and most operators come from
//! the Symbol font.
//!
//! Supported: `^`/`_` (single token or `{group}`), `\frac{a}{b}` (set as
//! `a/b`), `\sqrt{x}`, `\text{…}`/`\mathrm{…}`, `\mathbf{…}`, `\left`/
//! `\right`, spacing commands, Greek letters, common relations and big
//! operators. Unknown commands print their name in roman.

use super::metrics::winansi_byte;
use crate::error::ConversionError;

/// Which face a run uses. The layout engine maps faces onto fonts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFace {
    Italic,
    Roman,
    Bold,
    Symbol,
}

/// A span of encoded math text.
#[derive(Debug, Clone, PartialEq)]
pub struct MathRun {
    pub face: MathFace,
    /// WinAnsi bytes, or Symbol-encoded bytes for [`MathFace::Symbol`].
    pub bytes: Vec<u8>,
    /// Size relative to the surrounding text.
    pub scale: f32,
    /// Baseline shift in ems of the surrounding text (positive is up).
    pub rise: f32,
}

/// Typeset `tex` into runs.
pub fn typeset(tex: &str) -> Result<Vec<MathRun>, ConversionError> {
    let mut parser = Parser {
        chars: tex.chars().collect(),
        pos: 0,
        src: tex,
        out: Vec::new(),
    };
    parser.expr(Ctx::TOP, false)?;
    Ok(parser.out)
}

#[derive(Debug, Clone, Copy)]
struct Ctx {
    scale: f32,
    rise: f32,
}

impl Ctx {
    const TOP: Ctx = Ctx {
        scale: 1.0,
        rise: 0.0,
    };

    fn sup(self) -> Ctx {
        Ctx {
            scale: self.scale * 0.7,
            rise: self.rise + 0.4 * self.scale,
        }
    }

    fn sub(self) -> Ctx {
        Ctx {
            scale: self.scale * 0.7,
            rise: self.rise - 0.25 * self.scale,
        }
    }

    fn in_script(self) -> bool {
        self.scale < 1.0
    }
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    src: &'a str,
    out: Vec<MathRun>,
}

impl Parser<'_> {
    fn error(&self, detail: impl Into<String>) -> ConversionError {
        ConversionError::Math {
            expr: self.src.to_string(),
            detail: detail.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn emit(&mut self, face: MathFace, bytes: &[u8], ctx: Ctx) {
        if bytes.is_empty() {
            return;
        }
        if let Some(last) = self.out.last_mut() {
            if last.face == face && last.scale == ctx.scale && last.rise == ctx.rise {
                last.bytes.extend_from_slice(bytes);
                return;
            }
        }
        self.out.push(MathRun {
            face,
            bytes: bytes.to_vec(),
            scale: ctx.scale,
            rise: ctx.rise,
        });
    }

    fn emit_text(&mut self, face: MathFace, text: &str, ctx: Ctx) {
        let bytes: Vec<u8> = text.chars().map(winansi_byte).collect();
        self.emit(face, &bytes, ctx);
    }

    /// Parse atoms until end of input, or until `}` when `in_group`.
    fn expr(&mut self, ctx: Ctx, in_group: bool) -> Result<(), ConversionError> {
        loop {
            self.skip_ws();
            match self.peek() {
                None if in_group => return Err(self.error("unbalanced braces: missing '}'")),
                None => return Ok(()),
                Some('}') if in_group => {
                    self.pos += 1;
                    return Ok(());
                }
                Some('}') => return Err(self.error("unbalanced braces: unexpected '}'")),
                Some(_) => self.atom(ctx)?,
            }
        }
    }

    fn atom(&mut self, ctx: Ctx) -> Result<(), ConversionError> {
        let Some(c) = self.bump() else {
            return Ok(());
        };
        match c {
            '{' => self.expr(ctx, true),
            '^' => self.argument(ctx.sup(), "superscript"),
            '_' => self.argument(ctx.sub(), "subscript"),
            '\\' => self.command(ctx),
            '&' | '~' => {
                self.emit(MathFace::Roman, b" ", ctx);
                Ok(())
            }
            c if c.is_ascii_alphabetic() => {
                self.emit(MathFace::Italic, &[c as u8], ctx);
                Ok(())
            }
            c if c.is_ascii_digit() || c == '.' => {
                self.emit(MathFace::Roman, &[c as u8], ctx);
                Ok(())
            }
            '-' => {
                self.binary(MathFace::Symbol, 0x2D, ctx);
                Ok(())
            }
            '+' | '=' | '<' | '>' => {
                self.binary(MathFace::Roman, c as u8, ctx);
                Ok(())
            }
            '\'' => {
                self.emit(MathFace::Symbol, &[0xA2], ctx);
                Ok(())
            }
            other => {
                self.emit(MathFace::Roman, &[winansi_byte(other)], ctx);
                Ok(())
            }
        }
    }

    /// Binary operators and relations get a space on each side, except in scripts.
    fn binary(&mut self, face: MathFace, byte: u8, ctx: Ctx) {
        if ctx.in_script() {
            self.emit(face, &[byte], ctx);
        } else {
            self.emit(MathFace::Roman, b" ", ctx);
            self.emit(face, &[byte], ctx);
            self.emit(MathFace::Roman, b" ", ctx);
        }
    }

    /// A script or command argument: `{group}`, `\command` or one character.
    fn argument(&mut self, ctx: Ctx, what: &str) -> Result<(), ConversionError> {
        self.skip_ws();
        match self.peek() {
            None | Some('}') => Err(self.error(format!("{what} is missing its argument"))),
            Some('^') | Some('_') => Err(self.error(format!("{what} is missing its argument"))),
            Some(_) => self.atom(ctx),
        }
    }

    /// The raw text of a `{…}` group, for `\text`-like commands.
    fn raw_group(&mut self, command: &str) -> Result<String, ConversionError> {
        self.skip_ws();
        if self.bump() != Some('{') {
            return Err(self.error(format!("\\{command} needs a {{…}} argument")));
        }
        let mut depth = 1usize;
        let mut text = String::new();
        while let Some(c) = self.bump() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(text);
                    }
                }
                _ => {}
            }
            text.push(c);
        }
        Err(self.error("unbalanced braces: missing '}'"))
    }

    fn command_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if name.is_empty() {
            if let Some(c) = self.bump() {
                name.push(c);
            }
        }
        name
    }

    fn command(&mut self, ctx: Ctx) -> Result<(), ConversionError> {
        let name = self.command_name();
        if name.is_empty() {
            return Err(self.error("dangling '\\' at end of expression"));
        }

        if let Some(byte) = greek(&name) {
            self.emit(MathFace::Symbol, &[byte], ctx);
            return Ok(());
        }
        if let Some((byte, spaced)) = operator(&name) {
            if spaced {
                self.binary(MathFace::Symbol, byte, ctx);
            } else {
                self.emit(MathFace::Symbol, &[byte], ctx);
            }
            return Ok(());
        }

        match name.as_str() {
            "frac" | "dfrac" | "tfrac" => {
                self.argument(ctx, "\\frac numerator")
                    .map_err(|_| self.error("\\frac needs two arguments"))?;
                self.emit(MathFace::Roman, b"/", ctx);
                self.argument(ctx, "\\frac denominator")
                    .map_err(|_| self.error("\\frac needs two arguments"))
            }
            "sqrt" => {
                self.skip_ws();
                if self.peek() == Some('[') {
                    while let Some(c) = self.bump() {
                        if c == ']' {
                            break;
                        }
                    }
                }
                self.emit(MathFace::Symbol, &[0xD6], ctx);
                self.argument(ctx, "\\sqrt")
            }
            "text" | "textrm" | "mathrm" | "operatorname" | "mbox" => {
                let text = self.raw_group(&name)?;
                self.emit_text(MathFace::Roman, &text, ctx);
                Ok(())
            }
            "mathbf" | "textbf" | "boldsymbol" => {
                let text = self.raw_group(&name)?;
                self.emit_text(MathFace::Bold, &text, ctx);
                Ok(())
            }
            "mathit" | "textit" => {
                let text = self.raw_group(&name)?;
                self.emit_text(MathFace::Italic, &text, ctx);
                Ok(())
            }
            "left" | "right" | "big" | "Big" | "bigg" | "Bigg" => {
                self.skip_ws();
                if self.peek() == Some('.') {
                    self.pos += 1;
                }
                Ok(())
            }
            "," | ":" | ";" | " " | "quad" | "qquad" | "\\" => {
                let width: &[u8] = match name.as_str() {
                    "quad" => b"  ",
                    "qquad" => b"    ",
                    _ => b" ",
                };
                self.emit(MathFace::Roman, width, ctx);
                Ok(())
            }
            "!" => Ok(()),
            "{" | "}" | "%" | "$" | "_" | "&" | "#" | "|" => {
                self.emit_text(MathFace::Roman, &name, ctx);
                Ok(())
            }
            "sin" | "cos" | "tan" | "cot" | "sec" | "csc" | "log" | "ln" | "exp" | "lim"
            | "max" | "min" | "det" | "gcd" | "deg" | "dim" | "ker" | "arg" | "sup" | "inf"
            | "arcsin" | "arccos" | "arctan" | "sinh" | "cosh" | "tanh" | "mod" | "bmod" => {
                self.emit_text(MathFace::Roman, &name, ctx);
                if !ctx.in_script() {
                    self.emit(MathFace::Roman, b" ", ctx);
                }
                Ok(())
            }
            _ => {
                self.emit_text(MathFace::Roman, &name, ctx);
                Ok(())
            }
        }
    }
}

/// Greek letter → Symbol font byte.
fn greek(name: &str) -> Option<u8> {
    Some(match name {
        "alpha" => 0x61,
        "beta" => 0x62,
        "gamma" => 0x67,
        "delta" => 0x64,
        "epsilon" | "varepsilon" => 0x65,
        "zeta" => 0x7A,
        "eta" => 0x68,
        "theta" => 0x71,
        "vartheta" => 0x4A,
        "iota" => 0x69,
        "kappa" => 0x6B,
        "lambda" => 0x6C,
        "mu" => 0x6D,
        "nu" => 0x6E,
        "xi" => 0x78,
        "pi" => 0x70,
        "varpi" => 0x76,
        "rho" | "varrho" => 0x72,
        "sigma" => 0x73,
        "varsigma" => 0x56,
        "tau" => 0x74,
        "upsilon" => 0x75,
        "phi" => 0x66,
        "varphi" => 0x6A,
        "chi" => 0x63,
        "psi" => 0x79,
        "omega" => 0x77,
        "Gamma" => 0x47,
        "Delta" => 0x44,
        "Theta" => 0x51,
        "Lambda" => 0x4C,
        "Xi" => 0x58,
        "Pi" => 0x50,
        "Sigma" => 0x53,
        "Upsilon" => 0xA1,
        "Phi" => 0x46,
        "Psi" => 0x59,
        "Omega" => 0x57,
        _ => return None,
    })
}

/// Operator → (Symbol byte, spaced as a binary operator/relation).
fn operator(name: &str) -> Option<(u8, bool)> {
    Some(match name {
        "times" => (0xB4, true),
        "cdot" => (0xD7, true),
        "div" => (0xB8, true),
        "pm" => (0xB1, true),
        "leq" | "le" => (0xA3, true),
        "geq" | "ge" => (0xB3, true),
        "neq" | "ne" => (0xB9, true),
        "approx" => (0xBB, true),
        "equiv" => (0xBA, true),
        "sim" => (0x7E, true),
        "cong" => (0x40, true),
        "propto" => (0xB5, true),
        "to" | "rightarrow" => (0xAE, true),
        "leftarrow" | "gets" => (0xAC, true),
        "Rightarrow" | "implies" => (0xDE, true),
        "Leftarrow" => (0xDC, true),
        "leftrightarrow" => (0xAB, true),
        "Leftrightarrow" | "iff" => (0xDB, true),
        "in" => (0xCE, true),
        "notin" => (0xCF, true),
        "subset" => (0xCC, true),
        "subseteq" => (0xCD, true),
        "supset" => (0xC9, true),
        "supseteq" => (0xCA, true),
        "cup" => (0xC8, true),
        "cap" => (0xC7, true),
        "wedge" | "land" => (0xD9, true),
        "vee" | "lor" => (0xDA, true),
        "otimes" => (0xC4, true),
        "oplus" => (0xC5, true),
        "perp" => (0x5E, true),
        "mid" => (0x7C, true),
        "infty" => (0xA5, false),
        "sum" => (0xE5, false),
        "prod" => (0xD5, false),
        "int" => (0xF2, false),
        "partial" => (0xB6, false),
        "nabla" => (0xD1, false),
        "forall" => (0x22, false),
        "exists" => (0x24, false),
        "neg" | "lnot" => (0xD8, false),
        "emptyset" | "varnothing" => (0xC6, false),
        "angle" => (0xD0, false),
        "prime" => (0xA2, false),
        "langle" => (0xE1, false),
        "rangle" => (0xF1, false),
        "ldots" | "cdots" | "dots" => (0xBC, false),
        "uparrow" => (0xAD, false),
        "downarrow" => (0xAF, false),
        "aleph" => (0xC0, false),
        "Re" => (0xC2, false),
        "Im" => (0xC1, false),
        "bullet" => (0xB7, false),
        "circ" | "degree" => (0xB0, false),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faces(runs: &[MathRun]) -> Vec<MathFace> {
        runs.iter().map(|r| r.face).collect()
    }

    #[test]
    fn letters_are_italic_digits_roman() {
        let runs = typeset("x2").unwrap();
        assert_eq!(faces(&runs), vec![MathFace::Italic, MathFace::Roman]);
        assert_eq!(runs[0].bytes, b"x");
    }

    #[test]
    fn superscript_is_raised_and_smaller() {
        let runs = typeset("x^{2}").unwrap();
        let sup = &runs[1];
        assert_eq!(sup.bytes, b"2");
        assert!(sup.scale < 1.0);
        assert!(sup.rise > 0.0);

        let sub = &typeset("a_i").unwrap()[1];
        assert!(sub.rise < 0.0);
    }

    #[test]
    fn greek_and_operators_use_symbol_font() {
        let runs = typeset(r"\alpha \leq \beta").unwrap();
        let symbol: Vec<u8> = runs
            .iter()
            .filter(|r| r.face == MathFace::Symbol)
            .flat_map(|r| r.bytes.clone())
            .collect();
        assert_eq!(symbol, vec![0x61, 0xA3, 0x62]);
    }

    #[test]
    fn frac_renders_inline_with_slash() {
        let runs = typeset(r"\frac{a}{b}").unwrap();
        let text: Vec<u8> = runs.iter().flat_map(|r| r.bytes.clone()).collect();
        assert_eq!(text, b"a/b");
    }

    #[test]
    fn text_keeps_spaces() {
        let runs = typeset(r"\text{if } x").unwrap();
        assert_eq!(runs[0].face, MathFace::Roman);
        assert_eq!(runs[0].bytes, b"if ");
    }

    #[test]
    fn unknown_command_prints_name() {
        let runs = typeset(r"\foo").unwrap();
        assert_eq!(runs[0].bytes, b"foo");
        assert_eq!(runs[0].face, MathFace::Roman);
    }

    #[test]
    fn malformed_expressions_are_errors() {
        for bad in ["x^", "{a", "a}", r"\frac{a}", "x_{", "\\"] {
            let err = typeset(bad).unwrap_err();
            assert!(
                matches!(err, ConversionError::Math { .. }),
                "{bad} gave {err:?}"
            );
        }
    }
}
