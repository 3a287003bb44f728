//! # Asm — `.cca` Assembler
//!
//! Turns a program listing into the initial memory image of the stored-program
//! computer plus the table of named locations.
//!
//! ```text
//! LOAD x
//! ADD y
//! STOR x
//! EXIT
//!
//! DATA:
//! x = 3
//! y = 5
//! ```
//!
//! ## Layout
//!
//! Locations 0 and 1 are reserved (0 is the accumulator, named `A`). Each code
//! line takes two locations, opcode then operand. Data follows: a table is
//! placed as soon as the next location is aligned to its size rounded up to a
//! power of two, otherwise the most recently declared variable, otherwise a
//! zero pad.

use crate::config::MAX_BIT_WIDTH;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AsmError {
    /// `line` is 1-based; 0 marks a whole-program problem
    #[error("syntax error on line {line}: {reason}")]
    Syntax { line: usize, reason: String },
}

fn syntax<T>(line: usize, reason: impl Into<String>) -> Result<T, AsmError> {
    Err(AsmError::Syntax {
        line,
        reason: reason.into(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Exit = 0,
    Load = 1,
    Stor = 2,
    Add = 3,
    Swap = 4,
    Mult = 5,
    Inv = 6,
    Goto = 7,
    Skip = 8,
    Leap = 9,
    Indx = 10,
    Eq = 11,
    Gteq = 12,
}

impl Opcode {
    pub const COUNT: usize = 13;

    pub const ALL: [Opcode; Opcode::COUNT] = [
        Opcode::Exit,
        Opcode::Load,
        Opcode::Stor,
        Opcode::Add,
        Opcode::Swap,
        Opcode::Mult,
        Opcode::Inv,
        Opcode::Goto,
        Opcode::Skip,
        Opcode::Leap,
        Opcode::Indx,
        Opcode::Eq,
        Opcode::Gteq,
    ];

    pub fn code(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::Exit => "EXIT",
            Opcode::Load => "LOAD",
            Opcode::Stor => "STOR",
            Opcode::Add => "ADD",
            Opcode::Swap => "SWAP",
            Opcode::Mult => "MULT",
            Opcode::Inv => "INV",
            Opcode::Goto => "GOTO",
            Opcode::Skip => "SKIP",
            Opcode::Leap => "LEAP",
            Opcode::Indx => "INDX",
            Opcode::Eq => "EQ",
            Opcode::Gteq => "GTEQ",
        }
    }

    fn takes_operand(self) -> bool {
        !matches!(self, Opcode::Exit | Opcode::Inv)
    }
}

impl FromStr for Opcode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown instruction `{}`", s))
    }
}

/// Assembled memory image and the location of every name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Program {
    pub image: Vec<u64>,
    pub symbols: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Code,
    Data,
    Numbers,
    Tables,
}

impl Section {
    fn from_header(line: &str) -> Option<Self> {
        match line {
            "DATA:" => Some(Section::Data),
            "NUMBERS:" => Some(Section::Numbers),
            "TABLES:" => Some(Section::Tables),
            _ => None,
        }
    }
}

type Numbered<'a> = (usize, &'a str);

#[derive(Default)]
struct Sections<'a> {
    code: Vec<Numbered<'a>>,
    data: Vec<Numbered<'a>>,
    numbers: Vec<Numbered<'a>>,
    tables: Vec<Numbered<'a>>,
}

fn split_sections(text: &str) -> Result<Sections<'_>, AsmError> {
    let mut sections = Sections::default();
    let mut current = Some(Section::Code);
    for (idx, raw) in text.split('\n').enumerate() {
        let line_no = idx + 1;
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.is_empty() {
            current = None;
        } else if line.ends_with(':') {
            current = match Section::from_header(line) {
                Some(section) => Some(section),
                None => return syntax(line_no, format!("unknown section `{}`", line)),
            };
        } else {
            let bucket = match current {
                Some(Section::Code) => &mut sections.code,
                Some(Section::Data) => &mut sections.data,
                Some(Section::Numbers) => &mut sections.numbers,
                Some(Section::Tables) => &mut sections.tables,
                None => return syntax(line_no, "line outside any section"),
            };
            bucket.push((line_no, line));
        }
    }
    Ok(sections)
}

fn parse_hex(text: &str) -> Option<u64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16).ok()
}

/// Named values in declaration order. Redeclaring a name keeps its position.
#[derive(Default)]
struct Variables {
    entries: Vec<(String, u64)>,
}

impl Variables {
    fn insert(&mut self, name: &str, value: u64) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    fn get(&self, name: &str) -> Option<u64> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

fn parse_data(lines: &[Numbered<'_>], vars: &mut Variables) -> Result<(), AsmError> {
    for (line_no, line) in lines {
        let parts: Vec<&str> = line.split('=').map(str::trim).collect();
        let [name, value] = parts.as_slice() else {
            return syntax(*line_no, "expected `name = value`");
        };
        let Some(value) = parse_hex(value) else {
            return syntax(*line_no, format!("`{}` is not a hex value", value));
        };
        vars.insert(name, value);
    }
    Ok(())
}

fn parse_numbers(lines: &[Numbered<'_>], rows: u64) -> Result<BTreeSet<u64>, AsmError> {
    let mut numbers = BTreeSet::new();
    for (line_no, line) in lines {
        let mut range_start: Option<u64> = None;
        let mut previous: Option<u64> = None;
        for part in line.split_whitespace() {
            if part == "..." {
                match (previous, range_start) {
                    (Some(start), None) => range_start = Some(start),
                    _ => return syntax(*line_no, "`...` needs a number on its left"),
                }
                continue;
            }
            let Some(num) = parse_hex(part) else {
                return syntax(*line_no, format!("`{}` is not a hex value", part));
            };
            if let Some(start) = range_start.take() {
                if num.saturating_sub(start) >= rows {
                    return syntax(*line_no, format!("range {:X} ... {:X} spans more than {} rows", start, num, rows));
                }
                numbers.extend(start..=num);
            }
            numbers.insert(num);
            previous = Some(num);
        }
        if range_start.is_some() {
            return syntax(*line_no, "`...` needs a number on its right");
        }
    }
    Ok(numbers)
}

fn parse_tables(
    lines: &[Numbered<'_>],
    vars: &Variables,
    rows: u64,
) -> Result<Vec<(String, Vec<u64>)>, AsmError> {
    let mut tables: Vec<(String, Vec<u64>)> = Vec::new();
    for (line_no, line) in lines {
        let Some((head, values_text)) = line.split_once(':') else {
            return syntax(*line_no, "expected `COUNT name: values`");
        };
        let Some((count_text, name)) = head.split_once(' ') else {
            return syntax(*line_no, "expected `COUNT name: values`");
        };
        let Some(count) = parse_hex(count_text).or_else(|| vars.get(count_text)) else {
            return syntax(*line_no, format!("`{}` is neither hex nor a data name", count_text));
        };
        if count > rows {
            return syntax(*line_no, format!("table `{}` needs {} rows, memory has at most {}", name, count, rows));
        }
        let mut values = vec![0u64; count as usize];
        for (idx, text) in values_text.split_whitespace().enumerate() {
            let Some(value) = parse_hex(text) else {
                return syntax(*line_no, format!("`{}` is not a hex value", text));
            };
            match values.get_mut(idx) {
                Some(slot) => *slot = value,
                None => return syntax(*line_no, format!("table `{}` holds only {} values", name, count)),
            }
        }
        match tables.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = values,
            None => tables.push((name.to_string(), values)),
        }
    }
    Ok(tables)
}

fn alignment_bits(len: usize) -> u32 {
    match len {
        0 => 1,
        n => usize::BITS - (n - 1).leading_zeros(),
    }
}

/// Assemble `text` for a machine with `word_bits`-bit memory rows.
pub fn assemble(text: &str, word_bits: usize) -> Result<Program, AsmError> {
    let word_mask = if word_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << word_bits) - 1
    };
    // upper bound on addressable rows, which caps tables and NUMBERS ranges
    let rows = 1u64 << word_bits.min(MAX_BIT_WIDTH);
    let sections = split_sections(text)?;

    let mut vars = Variables::default();
    parse_data(&sections.data, &mut vars)?;
    let mut tables = parse_tables(&sections.tables, &vars, rows)?;
    for num in parse_numbers(&sections.numbers, rows)? {
        vars.insert(&num.to_string(), num & word_mask);
    }

    let mut image = vec![0u64; 2 + 2 * sections.code.len()];
    let mut symbols = BTreeMap::new();
    symbols.insert("A".to_string(), 0usize);

    while !tables.is_empty() || !vars.entries.is_empty() {
        let next = image.len();
        let aligned = tables
            .iter()
            .position(|(_, values)| next % (1usize << alignment_bits(values.len())) == 0);
        if let Some(idx) = aligned {
            let (name, values) = tables.remove(idx);
            symbols.insert(name, next);
            image.extend(values);
        } else if let Some((name, value)) = vars.entries.pop() {
            symbols.insert(name, next);
            image.push(value);
        } else {
            image.push(0);
        }
    }

    for (slot, (line_no, line)) in sections.code.iter().enumerate() {
        let mut parts = line.split_whitespace();
        let Some(mnemonic) = parts.next() else {
            return syntax(*line_no, "missing instruction");
        };
        let op = mnemonic
            .parse::<Opcode>()
            .or_else(|reason| syntax(*line_no, reason))?;
        let operand = if op.takes_operand() {
            let (Some(text), None) = (parts.next(), parts.next()) else {
                return syntax(*line_no, format!("`{}` takes exactly one operand", op.as_str()));
            };
            if op == Opcode::Goto {
                let Some(target) = parse_hex(text) else {
                    return syntax(*line_no, format!("`{}` is not a hex instruction number", text));
                };
                target.wrapping_sub(1) & word_mask
            } else {
                match symbols.get(text) {
                    Some(location) => *location as u64,
                    None => return syntax(*line_no, format!("undefined name `{}`", text)),
                }
            }
        } else {
            0
        };
        image[2 + 2 * slot] = op.code() as u64;
        image[3 + 2 * slot] = operand;
    }

    debug!(rows = image.len(), symbols = symbols.len(), "assembled program");
    Ok(Program { image, symbols })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_program_lays_out_code_then_data() {
        let program = assemble("LOAD x\nADD y\nSTOR z\nEXIT\n\nDATA:\nx = 3\ny = 5\nz = 0\n", 8).unwrap();
        // variables are placed most recent first
        assert_eq!(program.symbols["z"], 10);
        assert_eq!(program.symbols["y"], 11);
        assert_eq!(program.symbols["x"], 12);
        assert_eq!(program.symbols["A"], 0);
        assert_eq!(
            program.image,
            vec![0, 0, 1, 12, 3, 11, 2, 10, 0, 0, 0, 5, 3]
        );
    }

    #[test]
    fn goto_stores_previous_instruction() {
        let program = assemble("GOTO 3\nGOTO 0\nINV\n", 8).unwrap();
        assert_eq!(&program.image[2..8], &[7, 2, 7, 0xFF, 6, 0]);
    }

    #[test]
    fn accumulator_is_addressable_as_a() {
        let program = assemble("STOR A\nEXIT\n", 8).unwrap();
        assert_eq!(&program.image[2..4], &[2, 0]);
    }

    #[test]
    fn numbers_expand_ranges_and_wrap() {
        let program = assemble("LOAD 5\n\nNUMBERS:\n2 ... 5 1FF\n", 8).unwrap();
        for n in 2..=5u64 {
            let loc = program.symbols[&n.to_string()];
            assert_eq!(program.image[loc], n);
        }
        let wrapped = program.symbols["511"];
        assert_eq!(program.image[wrapped], 0xFF);
    }

    #[test]
    fn tables_wait_for_alignment() {
        let source = "LOAD t\n\nDATA:\nn = 4\n\nTABLES:\nn t: 1 2 3\n";
        let program = assemble(source, 8).unwrap();
        // code ends at 4, so the 4-entry table fits immediately
        assert_eq!(program.symbols["t"], 4);
        assert_eq!(&program.image[4..8], &[1, 2, 3, 0]);
        assert_eq!(program.symbols["n"], 8);

        let source = "LOAD t\nEXIT\n\nTABLES:\n4 t: 9\n";
        let program = assemble(source, 8).unwrap();
        assert_eq!(program.symbols["t"], 8, "padded from 6 up to 8");
        assert_eq!(&program.image[6..9], &[0, 0, 9]);
    }

    #[test]
    fn syntax_errors_report_line() {
        let cases = [
            ("LOAD\n", 1),
            ("JUMP x\n", 1),
            ("LOAD nope\n", 1),
            ("EXIT\n\nEXIT\n", 3),
            ("EXIT\nCODE:\n", 2),
            ("EXIT\nDATA:\nx 3\n", 3),
            ("EXIT\nDATA:\nx = zz\n", 3),
            ("EXIT\nNUMBERS:\n... 4\n", 3),
            ("EXIT\nNUMBERS:\n4 ...\n", 3),
            ("EXIT\nTABLES:\n2 t: 1 2 3\n", 3),
            ("EXIT\nTABLES:\nq t: 1\n", 3),
            ("EXIT\n\nTABLES:\nFFFFFFFFFFFFFFFF t: 1\n", 4),
            ("EXIT\nTABLES:\n101 t: 1\n", 3),
            ("EXIT\nNUMBERS:\n0 ... FFFFFFFFFFFF\n", 3),
            ("EXIT\nNUMBERS:\n1\n0 ... 100\n", 4),
        ];
        for (source, line) in cases {
            match assemble(source, 8) {
                Err(AsmError::Syntax { line: got, .. }) => assert_eq!(got, line, "{:?}", source),
                Ok(_) => panic!("accepted {:?}", source),
            }
        }
    }

    #[test]
    fn opcode_names_round_trip() {
        for op in Opcode::ALL {
            assert_eq!(op.as_str().parse::<Opcode>(), Ok(op));
        }
        assert_eq!(Opcode::Gteq.code(), 12);
    }
}
