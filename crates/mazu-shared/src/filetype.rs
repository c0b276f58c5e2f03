//! File type detection.
//!
//! Detectors are registered explicitly on a [`DetectorRegistry`] at startup.
//! The registry asks each detector in registration order and the first one
//! that recognises the payload decides the label.

use crate::constants::FILETYPE_UNKNOWN;

/// A single strategy for labelling a payload.
pub trait FileTypeDetector: Send + Sync {
    /// Short identifier stored alongside the label.
    fn name(&self) -> &'static str;

    /// Return a label if this detector recognises `content`.
    fn detect(&self, content: &[u8]) -> Option<String>;
}

/// Result of running the registry over a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub label: String,
    pub detector: &'static str,
}

#[derive(Default)]
pub struct DetectorRegistry {
    detectors: Vec<Box<dyn FileTypeDetector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in detectors: binary signatures first, then
    /// the plain-text fallback.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(MagicDetector).register(TextDetector);
        registry
    }

    pub fn register<D>(&mut self, detector: D) -> &mut Self
    where
        D: FileTypeDetector + 'static,
    {
        self.detectors.push(Box::new(detector));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn detect(&self, content: &[u8]) -> Detection {
        self.detectors
            .iter()
            .find_map(|d| {
                d.detect(content).map(|label| Detection {
                    label,
                    detector: d.name(),
                })
            })
            .unwrap_or_else(|| Detection {
                label: FILETYPE_UNKNOWN.to_string(),
                detector: "none",
            })
    }
}

// ---------------------------------------------------------------------------
// Magic-number detector
// ---------------------------------------------------------------------------

/// Recognises common executable, document and archive formats by their
/// leading signature bytes.
pub struct MagicDetector;

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "PDF document"),
    (b"PK\x03\x04", "Zip archive data"),
    (b"\x1f\x8b", "gzip compressed data"),
    (b"BZh", "bzip2 compressed data"),
    (b"Rar!\x1a\x07", "RAR archive data"),
    (b"7z\xbc\xaf\x27\x1c", "7-zip archive data"),
    (
        b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1",
        "Composite Document File V2 Document",
    ),
    (b"{\\rtf", "Rich Text Format data"),
    (b"dex\n", "Dalvik dex file"),
    (b"\x89PNG\r\n\x1a\n", "PNG image data"),
    (b"\xff\xd8\xff", "JPEG image data"),
    (b"GIF87a", "GIF image data"),
    (b"GIF89a", "GIF image data"),
    (b"\xfe\xed\xfa\xce", "Mach-O 32-bit executable"),
    (b"\xce\xfa\xed\xfe", "Mach-O 32-bit executable"),
    (b"\xfe\xed\xfa\xcf", "Mach-O 64-bit executable"),
    (b"\xcf\xfa\xed\xfe", "Mach-O 64-bit executable"),
];

impl FileTypeDetector for MagicDetector {
    fn name(&self) -> &'static str {
        "magic"
    }

    fn detect(&self, content: &[u8]) -> Option<String> {
        if content.starts_with(b"MZ") {
            return Some(describe_mz(content));
        }
        if content.starts_with(b"\x7fELF") {
            return Some(describe_elf(content));
        }
        if content.starts_with(b"\xca\xfe\xba\xbe") {
            return Some(describe_cafebabe(content));
        }
        SIGNATURES
            .iter()
            .find(|(magic, _)| content.starts_with(magic))
            .map(|(_, label)| (*label).to_string())
    }
}

fn read_u16_le(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32_le(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u32_be(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

// DOS stub; if e_lfanew points at a PE header, look at the COFF
// characteristics and optional header magic.
fn describe_mz(buf: &[u8]) -> String {
    let pe_offset = match read_u32_le(buf, 0x3c) {
        Some(offset) => offset as usize,
        None => return "MS-DOS executable".to_string(),
    };
    if buf.get(pe_offset..pe_offset + 4) != Some(b"PE\0\0".as_slice()) {
        return "MS-DOS executable".to_string();
    }

    let coff = pe_offset + 4;
    let characteristics = read_u16_le(buf, coff + 18).unwrap_or(0);
    let optional_magic = read_u16_le(buf, coff + 20).unwrap_or(0);

    let class = match optional_magic {
        0x20b => "PE32+ executable",
        _ => "PE32 executable",
    };
    if characteristics & 0x2000 != 0 {
        format!("{class} (DLL)")
    } else {
        class.to_string()
    }
}

fn describe_elf(buf: &[u8]) -> String {
    let class = match buf.get(4) {
        Some(2) => "64-bit",
        _ => "32-bit",
    };
    let order = match buf.get(5) {
        Some(2) => "MSB",
        _ => "LSB",
    };
    format!("ELF {class} {order} executable")
}

// 0xCAFEBABE is shared by Java class files and Mach-O fat binaries; a fat
// header is followed by a small architecture count, a class file by its
// version numbers (major version >= 45).
fn describe_cafebabe(buf: &[u8]) -> String {
    match read_u32_be(buf, 4) {
        Some(n) if n < 45 => "Mach-O universal binary".to_string(),
        _ => "compiled Java class data".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Text detector
// ---------------------------------------------------------------------------

/// Labels payloads that decode as text. Registered after the binary
/// detectors.
pub struct TextDetector;

impl FileTypeDetector for TextDetector {
    fn name(&self) -> &'static str {
        "text"
    }

    fn detect(&self, content: &[u8]) -> Option<String> {
        if content.is_empty() || content.contains(&0) {
            return None;
        }
        let text = std::str::from_utf8(content).ok()?;
        if text
            .chars()
            .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t' | '\x0c'))
        {
            return None;
        }

        if let Some(interpreter) = text.strip_prefix("#!") {
            let interpreter = interpreter
                .lines()
                .next()
                .and_then(|line| line.split_whitespace().last())
                .unwrap_or("sh");
            return Some(format!("{interpreter} script, text executable"));
        }
        if text.is_ascii() {
            Some("ASCII text".to_string())
        } else {
            Some("UTF-8 Unicode text".to_string())
        }
    }
}
