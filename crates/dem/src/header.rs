use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::DemError;

/// Magic bytes at offset 0 of every HL2 demo file.
pub const DEMO_MAGIC: &[u8; 8] = b"HL2DEMO\0";

/// Total size of the fixed demo header.
pub const HEADER_SIZE: usize = 1072;

// Server/client/map/gamedir are fixed-width NUL-padded fields.
const STRING_FIELD_LEN: usize = 260;

/// The fixed 1072-byte header at the start of a demo file.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoHeader {
    pub demo_protocol: i32,
    pub network_protocol: i32,
    pub server_name: String,
    pub client_name: String,
    pub map_name: String,
    pub game_dir: String,
    pub playback_seconds: f32,
    pub ticks: i32,
    pub frames: i32,
    pub signon_length: i32,
}

/// Read-only view of the header fields the recorder cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoInfo {
    pub map_name: String,
    pub total_ticks: u32,
}

impl DemoHeader {
    /// Parses the demo header from a reader positioned at the start of
    /// the file. The reader is advanced to [`HEADER_SIZE`].
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self, DemError> {
        let mut magic = [0u8; DEMO_MAGIC.len()];
        reader.read_exact(&mut magic)?;
        if &magic != DEMO_MAGIC {
            return Err(DemError::InvalidMagic);
        }

        let demo_protocol = reader.read_i32::<LittleEndian>()?;
        let network_protocol = reader.read_i32::<LittleEndian>()?;

        let server_name = read_string_field(reader, "server_name")?;
        let client_name = read_string_field(reader, "client_name")?;
        let map_name = read_string_field(reader, "map_name")?;
        let game_dir = read_string_field(reader, "game_dir")?;

        let playback_seconds = reader.read_f32::<LittleEndian>()?;
        let ticks = reader.read_i32::<LittleEndian>()?;
        let frames = reader.read_i32::<LittleEndian>()?;
        let signon_length = reader.read_i32::<LittleEndian>()?;

        Ok(DemoHeader {
            demo_protocol,
            network_protocol,
            server_name,
            client_name,
            map_name,
            game_dir,
            playback_seconds,
            ticks,
            frames,
            signon_length,
        })
    }

    /// The subset of header data exposed to callers.
    ///
    /// Corrupt demos can carry a negative tick count; it is clamped to 0
    /// so downstream range validation rejects every segment.
    pub fn info(&self) -> DemoInfo {
        DemoInfo {
            map_name: self.map_name.clone(),
            total_ticks: self.ticks.max(0) as u32,
        }
    }
}

fn read_string_field<R: Read>(reader: &mut R, field: &'static str) -> Result<String, DemError> {
    let mut buf = [0u8; STRING_FIELD_LEN];
    reader.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(STRING_FIELD_LEN);
    match std::str::from_utf8(&buf[..end]) {
        Ok(s) => Ok(s.to_owned()),
        Err(_) => Err(DemError::InvalidString { field }),
    }
}
