//! Two-pass assembler: source text in, a headered binary image (plus optional
//! debug sidecars) out.

pub mod encoder;
pub mod lexer;
pub mod numerals;
pub mod symbols;

use isa_core::error::AsmError;
use isa_core::header::ImageHeader;

use encoder::DebugChunk;
use symbols::SymbolTable;

/// Everything produced by one call to [`assemble`].
pub struct Assembled {
    /// The final image: header + data segment + code segment.
    pub image: Vec<u8>,
    pub symbols: SymbolTable,
    chunks: Vec<DebugChunk>,
    header: ImageHeader,
}

impl Assembled {
    /// Renders the `<out>.hex` sidecar: one line per emitted unit, space-separated
    /// two-hex-digit bytes, header first.
    pub fn hex_listing(&self) -> String {
        let mut lines = Vec::with_capacity(self.chunks.len() + 1);
        lines.push(hex_line(&self.header.to_bytes()));
        for chunk in &self.chunks {
            lines.push(hex_line(&chunk.bytes));
        }
        lines.join("\n") + "\n"
    }

    /// Renders the `<out>.dbg` sidecar: a tabular address/instruction/hex listing.
    pub fn debug_listing(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{:<10} {:<35} {}\n", "ADDRESS", "INSTRUCTION", "HEX"));
        out.push_str(&"=".repeat(60));
        out.push('\n');
        for chunk in &self.chunks {
            out.push_str(&format!("{:<10} {:<35} {}\n", chunk.addr, chunk.instr, hex_line(&chunk.bytes)));
        }
        out
    }

    /// Renders the `<out>.symbols` sidecar: `name = address` per line.
    pub fn symbols_listing(&self) -> String {
        let mut names: Vec<&String> = self.symbols.symbols.keys().collect();
        names.sort();
        let mut out = String::new();
        for name in names {
            out.push_str(&format!("{} = {}\n", name, self.symbols.symbols[name]));
        }
        out
    }
}

fn hex_line(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" ")
}

/// Assembles a complete source file into a binary image.
pub fn assemble(source: &str) -> Result<Assembled, AsmError> {
    let lines = lexer::clean_source(source);
    let symbol_table = symbols::resolve(&lines)?;
    let (data_buf, code_buf, chunks) = encoder::encode(&lines, &symbol_table)?;

    let header = ImageHeader::new(data_buf.len() as u16, code_buf.len() as u16);

    let mut image = Vec::with_capacity(16 + data_buf.len() + code_buf.len());
    image.extend_from_slice(&header.to_bytes());
    image.extend_from_slice(&data_buf);
    image.extend_from_slice(&code_buf);

    Ok(Assembled { image, symbols: symbol_table, chunks, header })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_header_consistent_with_segment_lengths() {
        let assembled = assemble(".data\ns .asciiz 'Hi'\n.code\nHALT\n").unwrap();
        let header = ImageHeader::from_bytes(&assembled.image).unwrap();
        assert_eq!(header.data_offset, 16);
        assert_eq!(header.code_offset, 16 + header.data_length);
        assert_eq!(header.entry_point, header.code_offset);
        assert_eq!(header.data_length, 3);
        assert_eq!(header.code_length, 1);
    }

    #[test]
    fn symbols_listing_is_sorted_and_complete() {
        let assembled = assemble(".data\nx .byte 1\n.code\nstart:\nHALT\n").unwrap();
        let listing = assembled.symbols_listing();
        assert!(listing.contains("start = 1"));
        assert!(listing.contains("x = 0"));
    }

    #[test]
    fn hex_listing_begins_with_header_row() {
        let assembled = assemble(".code\nHALT\n").unwrap();
        let listing = assembled.hex_listing();
        let first_line = listing.lines().next().unwrap();
        assert_eq!(first_line.split(' ').count(), 16);
    }

    #[test]
    fn round_trip_recursion_scenario_assembles() {
        let src = r#"
.data
n .byte 5
.code
LD R0, n
CALL fact
SYS R0, 0x0002
HALT
fact:
PUSH R0
JZ fact_base
HALT
fact_base:
RET
"#;
        let assembled = assemble(src).unwrap();
        assert!(assembled.image.len() > 16);
    }
}
