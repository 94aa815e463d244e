/// Breakpoint location specifiers and their `-break-insert` argument
/// serialization. The three shapes and their exact text forms are lifted
/// from the interpreter's `loc_for_break` overloads rather than invented:
/// GDB accepts several equivalent spellings and picks different parsers
/// depending on which fields are set, so the serialization has to match
/// byte-for-byte or GDB silently resolves to the wrong location.
use std::fmt;

/// A `file:line`/function/label/offset location, GDB's "linespec" form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Linespec {
    pub file: Option<String>,
    pub line: Option<u64>,
    pub function: Option<String>,
    pub label: Option<String>,
    pub offset: Option<i64>,
}

impl Linespec {
    pub fn line(line: u64) -> Self {
        Linespec { line: Some(line), ..Default::default() }
    }

    pub fn function(name: impl Into<String>) -> Self {
        Linespec { function: Some(name.into()), ..Default::default() }
    }

    pub fn file_line(file: impl Into<String>, line: u64) -> Self {
        Linespec { file: Some(file.into()), line: Some(line), ..Default::default() }
    }

    fn to_mi_arg(&self) -> String {
        if let Some(offset) = self.offset {
            return offset.to_string();
        }
        if let (None, Some(line)) = (&self.file, self.line) {
            if self.function.is_none() && self.label.is_none() {
                return line.to_string();
            }
        }
        match (&self.file, self.line, &self.function, &self.label) {
            (Some(file), Some(line), _, _) => format!("{file}:{line}"),
            (Some(file), None, Some(function), _) => format!("{file}:{function}"),
            (None, None, Some(function), Some(label)) => format!("{function}:{label}"),
            (None, None, Some(function), None) => function.clone(),
            (None, None, None, Some(label)) => label.clone(),
            _ => String::new(),
        }
    }
}

/// An `--source`/`--function`/`--label`/`--line` explicit location. GDB
/// renders these as separate flagged arguments rather than one colon-joined
/// string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Explicit {
    pub source: Option<String>,
    pub function: Option<String>,
    pub label: Option<String>,
    pub line: Option<i64>,
    /// When true, a set `line` is an offset from the current line
    /// (`--line +N`/`--line -N`) rather than an absolute line number.
    pub line_is_offset: bool,
}

impl Explicit {
    fn to_mi_arg(&self) -> String {
        let mut parts = Vec::new();
        if let Some(source) = &self.source {
            parts.push(format!("--source {source}"));
        }
        if let Some(function) = &self.function {
            parts.push(format!("--function {function}"));
        }
        if let Some(label) = &self.label {
            parts.push(format!("--label {label}"));
        }
        if let Some(line) = self.line {
            if self.line_is_offset && line >= 0 {
                parts.push(format!("--line +{line}"));
            } else {
                parts.push(format!("--line {line}"));
            }
        }
        parts.join(" ")
    }
}

/// An address-expression location: `*expr`, `*0xADDR`, or
/// `*'file'0xADDR` when the address needs disambiguating by file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub expression: Option<String>,
    pub func_addr: Option<u64>,
    pub file: Option<String>,
}

impl Address {
    fn to_mi_arg(&self) -> String {
        match (&self.file, self.func_addr, &self.expression) {
            (Some(file), Some(addr), _) => format!("*'{file}'0x{addr:x}"),
            (None, Some(addr), _) => format!("*0x{addr:x}"),
            (_, None, Some(expr)) => format!("*{expr}"),
            _ => String::new(),
        }
    }
}

/// A breakpoint location, in any of the three forms GDB's `-break-insert`
/// accepts, or a raw already-formatted argument for callers that need an
/// escape hatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Linespec(Linespec),
    Explicit(Explicit),
    Address(Address),
    Raw(String),
}

impl Locator {
    pub fn to_mi_arg(&self) -> String {
        match self {
            Locator::Linespec(l) => l.to_mi_arg(),
            Locator::Explicit(e) => e.to_mi_arg(),
            Locator::Address(a) => a.to_mi_arg(),
            Locator::Raw(s) => s.clone(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_mi_arg())
    }
}

impl From<&str> for Locator {
    fn from(s: &str) -> Self {
        Locator::Raw(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linespec_line_only_is_bare_number() {
        assert_eq!(Locator::Linespec(Linespec::line(42)).to_mi_arg(), "42");
    }

    #[test]
    fn linespec_offset_only_is_bare_number() {
        let loc = Linespec { offset: Some(-3), ..Default::default() };
        assert_eq!(Locator::Linespec(loc).to_mi_arg(), "-3");
    }

    #[test]
    fn linespec_file_and_line() {
        assert_eq!(Locator::Linespec(Linespec::file_line("t.c", 10)).to_mi_arg(), "t.c:10");
    }

    #[test]
    fn linespec_function_only() {
        assert_eq!(Locator::Linespec(Linespec::function("main")).to_mi_arg(), "main");
    }

    #[test]
    fn linespec_function_and_label() {
        let loc = Linespec {
            function: Some("main".into()),
            label: Some("retry".into()),
            ..Default::default()
        };
        assert_eq!(Locator::Linespec(loc).to_mi_arg(), "main:retry");
    }

    #[test]
    fn linespec_file_and_function() {
        let loc = Linespec {
            file: Some("t.c".into()),
            function: Some("main".into()),
            ..Default::default()
        };
        assert_eq!(Locator::Linespec(loc).to_mi_arg(), "t.c:main");
    }

    #[test]
    fn explicit_joins_flags_with_spaces() {
        let loc = Explicit {
            source: Some("t.c".into()),
            function: Some("main".into()),
            line: Some(3),
            line_is_offset: true,
            ..Default::default()
        };
        assert_eq!(Locator::Explicit(loc).to_mi_arg(), "--source t.c --function main --line +3");
    }

    #[test]
    fn explicit_negative_offset_has_no_extra_sign() {
        let loc = Explicit { line: Some(-2), line_is_offset: true, ..Default::default() };
        assert_eq!(Locator::Explicit(loc).to_mi_arg(), "--line -2");
    }

    #[test]
    fn address_bare_expression() {
        let loc = Address { expression: Some("$pc+4".into()), ..Default::default() };
        assert_eq!(Locator::Address(loc).to_mi_arg(), "*$pc+4");
    }

    #[test]
    fn address_func_addr_only() {
        let loc = Address { func_addr: Some(0x1000), ..Default::default() };
        assert_eq!(Locator::Address(loc).to_mi_arg(), "*0x1000");
    }

    #[test]
    fn address_with_disambiguating_file() {
        let loc = Address { func_addr: Some(0x1000), file: Some("t.c".into()), ..Default::default() };
        assert_eq!(Locator::Address(loc).to_mi_arg(), "*'t.c'0x1000");
    }
}
