//! Data file addressing for file/register-addressed controllers
//!
//! SLC 500, MicroLogix and PLC-5 controllers expose numbered data files
//! instead of a symbol table. An address names a file type, a file number,
//! an element and optionally a sub-element or bit:
//!
//! | Text        | Meaning                                   |
//! |-------------|-------------------------------------------|
//! | `N7:0`      | Integer file 7, element 0                 |
//! | `B3:1/4`    | Binary file 3, word 1, bit 4              |
//! | `T4:0.ACC`  | Timer file 4, element 0, accumulator      |
//! | `ST10:2`    | String file 10, element 2                 |

use crate::error::{Result, TrendError};
use crate::types::{TagAddress, TagDataType};
use serde::{Deserialize, Serialize};

/// Number of bits in a data file word
pub const WORD_BITS: u8 = 16;

/// Type of a data file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileType {
    /// Output image (`O`)
    Output,
    /// Input image (`I`)
    Input,
    /// Status file (`S`)
    Status,
    /// Bit file (`B`)
    Binary,
    /// Timers (`T`)
    Timer,
    /// Counters (`C`)
    Counter,
    /// Control structures (`R`)
    Control,
    /// 16-bit integers (`N`)
    Integer,
    /// 32-bit floats (`F`)
    Float,
    /// Strings (`ST`)
    String,
    /// ASCII characters (`A`)
    Ascii,
    /// 32-bit integers (`L`)
    Long,
}

/// Probe ordering used when inferring the type of a data file
pub const PROBE_ORDER: [FileType; 9] = [
    FileType::Integer,
    FileType::Float,
    FileType::Binary,
    FileType::Timer,
    FileType::Counter,
    FileType::Control,
    FileType::String,
    FileType::Ascii,
    FileType::Long,
];

/// Highest file number that has a well-known default type
pub const LAST_DEFAULT_FILE: u8 = 8;

impl FileType {
    /// Address prefix (`N`, `ST`, ...)
    pub fn prefix(&self) -> &'static str {
        match self {
            FileType::Output => "O",
            FileType::Input => "I",
            FileType::Status => "S",
            FileType::Binary => "B",
            FileType::Timer => "T",
            FileType::Counter => "C",
            FileType::Control => "R",
            FileType::Integer => "N",
            FileType::Float => "F",
            FileType::String => "ST",
            FileType::Ascii => "A",
            FileType::Long => "L",
        }
    }

    /// Parse an address prefix
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Some(match prefix.to_ascii_uppercase().as_str() {
            "O" => FileType::Output,
            "I" => FileType::Input,
            "S" => FileType::Status,
            "B" => FileType::Binary,
            "T" => FileType::Timer,
            "C" => FileType::Counter,
            "R" => FileType::Control,
            "N" => FileType::Integer,
            "F" => FileType::Float,
            "ST" => FileType::String,
            "A" => FileType::Ascii,
            "L" => FileType::Long,
            _ => return None,
        })
    }

    /// Well-known default type of files 0-8
    pub fn default_for_file(file_number: u8) -> Option<Self> {
        Some(match file_number {
            0 => FileType::Output,
            1 => FileType::Input,
            2 => FileType::Status,
            3 => FileType::Binary,
            4 => FileType::Timer,
            5 => FileType::Counter,
            6 => FileType::Control,
            7 => FileType::Integer,
            8 => FileType::Float,
            _ => return None,
        })
    }

    /// Image/status spaces that answer reads for any file number
    ///
    /// Only the default files may resolve to these types.
    pub fn is_image_space(&self) -> bool {
        matches!(self, FileType::Output | FileType::Input | FileType::Status)
    }

    /// Word files that expand into 16 bit tags per element
    pub fn is_bit_addressable(&self) -> bool {
        matches!(
            self,
            FileType::Integer
                | FileType::Binary
                | FileType::Output
                | FileType::Input
                | FileType::Status
        )
    }

    /// Named sub-elements of structured files
    pub fn sub_elements(&self) -> &'static [SubElement] {
        use SubElement::*;
        match self {
            FileType::Timer => &[Pre, Acc, En, Tt, Dn],
            FileType::Counter => &[Pre, Acc, Cu, Cd, Dn, Ov, Un],
            FileType::Control => &[Len, Pos, En, Eu, Dn, Em, Er, Ul, In, Fd],
            _ => &[],
        }
    }

    /// Value type of a whole element
    pub fn element_data_type(&self) -> TagDataType {
        match self {
            FileType::Float => TagDataType::Float,
            FileType::String | FileType::Ascii => TagDataType::Text,
            _ => TagDataType::Integer,
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileType::Output => "Output",
            FileType::Input => "Input",
            FileType::Status => "Status",
            FileType::Binary => "Binary",
            FileType::Timer => "Timer",
            FileType::Counter => "Counter",
            FileType::Control => "Control",
            FileType::Integer => "Integer",
            FileType::Float => "Float",
            FileType::String => "String",
            FileType::Ascii => "ASCII",
            FileType::Long => "Long",
        };
        write!(f, "{}", name)
    }
}

/// Named member of a timer, counter or control element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubElement {
    /// Preset
    Pre,
    /// Accumulator
    Acc,
    /// Enable bit
    En,
    /// Timer timing bit
    Tt,
    /// Done bit
    Dn,
    /// Count up enable
    Cu,
    /// Count down enable
    Cd,
    /// Overflow
    Ov,
    /// Underflow
    Un,
    /// Length
    Len,
    /// Position
    Pos,
    /// Unload enable
    Eu,
    /// Empty
    Em,
    /// Error
    Er,
    /// Unload
    Ul,
    /// Inhibit
    In,
    /// Found
    Fd,
}

impl SubElement {
    /// Mnemonic used in addresses (`ACC`, `DN`, ...)
    pub fn mnemonic(&self) -> &'static str {
        match self {
            SubElement::Pre => "PRE",
            SubElement::Acc => "ACC",
            SubElement::En => "EN",
            SubElement::Tt => "TT",
            SubElement::Dn => "DN",
            SubElement::Cu => "CU",
            SubElement::Cd => "CD",
            SubElement::Ov => "OV",
            SubElement::Un => "UN",
            SubElement::Len => "LEN",
            SubElement::Pos => "POS",
            SubElement::Eu => "EU",
            SubElement::Em => "EM",
            SubElement::Er => "ER",
            SubElement::Ul => "UL",
            SubElement::In => "IN",
            SubElement::Fd => "FD",
        }
    }

    /// Parse a mnemonic
    pub fn from_mnemonic(text: &str) -> Option<Self> {
        use SubElement::*;
        [Pre, Acc, En, Tt, Dn, Cu, Cd, Ov, Un, Len, Pos, Eu, Em, Er, Ul, In, Fd]
            .into_iter()
            .find(|s| s.mnemonic().eq_ignore_ascii_case(text))
    }

    /// Whether this member is a status bit
    pub fn is_bit(&self) -> bool {
        !matches!(
            self,
            SubElement::Pre | SubElement::Acc | SubElement::Len | SubElement::Pos
        )
    }
}

/// Address of one element (or sub-element) of a data file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileAddress {
    /// File type
    pub file_type: FileType,
    /// File number 0-255
    pub file_number: u8,
    /// Element index
    pub element: u16,
    /// Sub-element of a structured element
    #[serde(default)]
    pub sub: Option<SubElement>,
}

impl FileAddress {
    /// Create an element address
    pub fn new(file_type: FileType, file_number: u8, element: u16) -> Self {
        Self {
            file_type,
            file_number,
            element,
            sub: None,
        }
    }

    /// Address a sub-element of this element
    pub fn with_sub(mut self, sub: SubElement) -> Self {
        self.sub = Some(sub);
        self
    }

    /// Value type read from this address
    pub fn data_type(&self) -> TagDataType {
        match self.sub {
            Some(sub) if sub.is_bit() => TagDataType::Bool,
            Some(_) => TagDataType::Integer,
            None => self.file_type.element_data_type(),
        }
    }
}

impl std::fmt::Display for FileAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}:{}",
            self.file_type.prefix(),
            self.file_number,
            self.element
        )?;
        if let Some(sub) = self.sub {
            write!(f, ".{}", sub.mnemonic())?;
        }
        Ok(())
    }
}

impl std::str::FromStr for FileAddress {
    type Err = TrendError;

    fn from_str(s: &str) -> Result<Self> {
        match parse_tag_address(s)? {
            TagAddress::FileElement(addr) => Ok(addr),
            _ => Err(invalid(s, "expected an element address")),
        }
    }
}

fn invalid(text: &str, reason: &str) -> TrendError {
    TrendError::InvalidConfiguration(format!("invalid address '{}': {}", text, reason))
}

/// Parse a file-addressed tag (`N7:0`, `B3:1/4`, `T4:0.ACC`)
pub fn parse_tag_address(text: &str) -> Result<TagAddress> {
    let text = text.trim();
    let prefix_len = text
        .find(|c: char| !c.is_ascii_alphabetic())
        .ok_or_else(|| invalid(text, "missing file number"))?;
    let file_type = FileType::from_prefix(&text[..prefix_len])
        .ok_or_else(|| invalid(text, "unknown file type"))?;

    let rest = &text[prefix_len..];
    let (file_part, rest) = rest
        .split_once(':')
        .ok_or_else(|| invalid(text, "missing ':'"))?;
    let file_number: u8 = file_part
        .parse()
        .map_err(|_| invalid(text, "file number must be 0-255"))?;

    let (element_part, suffix) = match rest.find(['.', '/']) {
        Some(idx) => (&rest[..idx], Some((&rest[idx..idx + 1], &rest[idx + 1..]))),
        None => (rest, None),
    };
    let element: u16 = element_part
        .parse()
        .map_err(|_| invalid(text, "bad element index"))?;
    let addr = FileAddress::new(file_type, file_number, element);

    match suffix {
        None => Ok(TagAddress::FileElement(addr)),
        Some((".", mnemonic)) => {
            let sub = SubElement::from_mnemonic(mnemonic)
                .filter(|s| file_type.sub_elements().contains(s))
                .ok_or_else(|| invalid(text, "unknown sub-element"))?;
            Ok(TagAddress::FileElement(addr.with_sub(sub)))
        }
        Some((_, bit_part)) => {
            if !file_type.is_bit_addressable() {
                return Err(invalid(text, "file type has no addressable bits"));
            }
            let bit: u8 = bit_part.parse().map_err(|_| invalid(text, "bad bit index"))?;
            if bit >= WORD_BITS {
                return Err(invalid(text, "bit index must be 0-15"));
            }
            Ok(TagAddress::FileBit { word: addr, bit })
        }
    }
}
