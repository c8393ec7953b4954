//! Printer control commands.
//!
//! Every command the driver can send is a variant of [`Command`]; its byte
//! encoding is fixed at construction time.
//!
//! | Command      | Bytes                             |
//! |--------------|-----------------------------------|
//! | Wake         | `FF`                              |
//! | Init         | `1B 40`                           |
//! | Font         | `1B 21 <mode>`                    |
//! | Char table   | `1B 74 <table>`                   |
//! | Heat config  | `1B 37 <dots> <time> <interval>`  |
//! | Begin bitmap | `12 2A <rows> <byte width>`       |
//! | Sleep        | `1B 38 01 00`                     |
//! | Status mode  | `1D 61 <value>`                   |
//! | Text         | single-byte encoded characters    |

use bitflags::bitflags;

use crate::error::Error;

pub const ESC: u8 = 0x1B;
pub const GS: u8 = 0x1D;
pub const DC2: u8 = 0x12;
pub const WAKE: u8 = 0xFF;

bitflags! {
    /// Named print mode bits for `ESC !`.
    ///
    /// [`Command::Font`] takes the raw byte, so bits without a name here can
    /// still be sent: `Command::Font(FontMode::EMPHASIZED.bits())`.
    pub struct FontMode: u8 {
        const FONT_B = 0b0000_0001;
        const INVERSE = 0b0000_0010;
        const UPSIDE_DOWN = 0b0000_0100;
        const EMPHASIZED = 0b0000_1000;
        const DOUBLE_HEIGHT = 0b0001_0000;
        const DOUBLE_WIDTH = 0b0010_0000;
        const STRIKE = 0b0100_0000;
        const UNDERLINE = 0b1000_0000;
    }
}

/// Thermal head timing parameters for `ESC 7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeatConfig {
    /// Maximum heating dots, in units of 8 dots.
    pub dots: u8,
    /// Heating time, in units of 10 us.
    pub time: u8,
    /// Heating interval, in units of 10 us.
    pub interval: u8,
}

impl HeatConfig {
    pub fn new(dots: u8, time: u8, interval: u8) -> Self {
        HeatConfig {
            dots,
            time,
            interval,
        }
    }
}

impl Default for HeatConfig {
    /// Firmware power-on values.
    fn default() -> Self {
        HeatConfig::new(7, 80, 2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Wake,
    Init,
    /// Print mode byte, see [`FontMode`] for the known bits.
    Font(u8),
    CharTable(u8),
    HeatConfig(HeatConfig),
    /// Announces `rows` raster rows of `byte_width` bytes each.
    BeginBitmap {
        byte_width: u8,
        rows: u8,
    },
    /// Raster bytes following a `BeginBitmap`.
    BitmapData(Vec<u8>),
    Sleep,
    /// Automatic status back: `rts` enables the RTS/busy signal, `asb`
    /// enables paper status reports.
    StatusBack {
        rts: bool,
        asb: bool,
    },
    Text(Vec<u8>),
}

impl Command {
    /// Encode `text` one byte per character.
    ///
    /// The firmware only understands single-byte character sets, so every
    /// character must lie in the Latin-1 range.
    pub fn text(text: &str) -> Result<Command, Error> {
        let bytes = text
            .chars()
            .map(|c| {
                if (c as u32) <= 0xFF {
                    Ok(c as u32 as u8)
                } else {
                    Err(Error::UnencodableText(c))
                }
            })
            .collect::<Result<Vec<u8>, Error>>()?;
        Ok(Command::Text(bytes))
    }

    /// Short name used in logs and state errors.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Wake => "wake",
            Command::Init => "init",
            Command::Font(_) => "font",
            Command::CharTable(_) => "char_table",
            Command::HeatConfig(_) => "heat_config",
            Command::BeginBitmap { .. } => "begin_bitmap",
            Command::BitmapData(_) => "bitmap_data",
            Command::Sleep => "sleep",
            Command::StatusBack { .. } => "status_back",
            Command::Text(_) => "text",
        }
    }

    /// Commands the printer needs time to recover from before accepting more bytes.
    pub fn needs_settle_delay(&self) -> bool {
        matches!(self, Command::Wake | Command::Init)
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::Wake => vec![WAKE],
            Command::Init => vec![ESC, b'@'],
            Command::Font(mode) => vec![ESC, b'!', *mode],
            Command::CharTable(table) => vec![ESC, b't', *table],
            Command::HeatConfig(heat) => vec![ESC, b'7', heat.dots, heat.time, heat.interval],
            Command::BeginBitmap { byte_width, rows } => vec![DC2, b'*', *rows, *byte_width],
            Command::BitmapData(data) => data.clone(),
            Command::Sleep => vec![ESC, b'8', 1, 0],
            Command::StatusBack { rts, asb } => {
                let value = ((*asb as u8) << 2) | ((*rts as u8) << 5);
                vec![GS, b'a', value]
            }
            Command::Text(bytes) => bytes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_handshake_bytes() {
        assert_eq!(Command::Wake.encode(), vec![0xFF]);
        assert_eq!(Command::Init.encode(), vec![0x1B, 0x40]);
        assert_eq!(Command::Sleep.encode(), vec![0x1B, 0x38, 0x01, 0x00]);
    }

    #[test]
    fn test_heat_config_bytes() {
        let command = Command::HeatConfig(HeatConfig::new(10, 140, 4));
        assert_eq!(command.encode(), vec![0x1B, 0x37, 0x0A, 0x8C, 0x04]);
        assert_eq!(
            Command::HeatConfig(HeatConfig::default()).encode(),
            vec![0x1B, 0x37, 7, 80, 2]
        );
    }

    #[test]
    fn test_status_back_bytes() {
        let encode = |rts, asb| Command::StatusBack { rts, asb }.encode();
        assert_eq!(encode(true, false), vec![0x1D, 0x61, 0x20]);
        assert_eq!(encode(false, true), vec![0x1D, 0x61, 0x04]);
        assert_eq!(encode(true, true), vec![0x1D, 0x61, 0x24]);
        assert_eq!(encode(false, false), vec![0x1D, 0x61, 0x00]);
    }

    #[test]
    fn test_begin_bitmap_puts_rows_first() {
        let command = Command::BeginBitmap {
            byte_width: 48,
            rows: 255,
        };
        assert_eq!(command.encode(), vec![0x12, 0x2A, 0xFF, 0x30]);
    }

    #[test]
    fn test_font_and_char_table_bytes() {
        let mode = FontMode::EMPHASIZED | FontMode::DOUBLE_HEIGHT;
        assert_eq!(Command::Font(mode.bits()).encode(), vec![0x1B, 0x21, 0x18]);
        assert_eq!(
            Command::Font(FontMode::empty().bits()).encode(),
            vec![0x1B, 0x21, 0x00]
        );
        assert_eq!(Command::CharTable(3).encode(), vec![0x1B, 0x74, 0x03]);
    }

    #[test]
    fn test_font_sends_any_mode_byte() {
        assert_eq!(Command::Font(0x46).encode(), vec![0x1B, 0x21, 0x46]);
        assert_eq!(Command::Font(0xFF).encode(), vec![0x1B, 0x21, 0xFF]);

        let mode = FontMode::INVERSE | FontMode::UPSIDE_DOWN | FontMode::STRIKE;
        assert_eq!(mode.bits(), 0x46);
    }

    #[test]
    fn test_text_is_single_byte() {
        assert_eq!(
            Command::text("Hi é\n").unwrap().encode(),
            vec![b'H', b'i', b' ', 0xE9, b'\n']
        );
        assert!(matches!(
            Command::text("snow ☃"),
            Err(Error::UnencodableText('☃'))
        ));
    }

    #[test]
    fn test_settle_delay_only_for_handshake() {
        assert!(Command::Wake.needs_settle_delay());
        assert!(Command::Init.needs_settle_delay());
        assert!(!Command::Sleep.needs_settle_delay());
        assert!(!Command::Text(vec![]).needs_settle_delay());
    }
}
