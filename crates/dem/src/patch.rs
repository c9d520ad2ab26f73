use memchr::{memchr, memmem};

use crate::DemError;

/// SVC_ServerInfo framing bytes that sit immediately ahead of the
/// length-prefixed game directory string inside the signon payload.
/// Old and new network protocols frame the message differently.
pub const GAME_DIR_ANCHORS: [[u8; 5]; 2] = [
    [0x00, 0x2C, 0x00, 0x18, 0x0A],
    [0x00, 0x38, 0x00, 0x18, 0x0A],
];

// Offset of the length byte relative to the anchor start.
const ANCHOR_LEN: usize = 5;

fn locate_anchor(data: &[u8]) -> Option<usize> {
    GAME_DIR_ANCHORS
        .iter()
        .find_map(|sig| memmem::find(data, sig))
}

/// Locates the token region: (length byte offset, token start, token end).
fn locate_token(data: &[u8]) -> Result<(usize, usize, usize), DemError> {
    let anchor = locate_anchor(data).ok_or(DemError::AnchorNotFound)?;
    let len_at = anchor + ANCHOR_LEN;
    let start = len_at + 1;
    if start > data.len() {
        return Err(DemError::UnterminatedToken);
    }
    let nul = memchr(0, &data[start..]).ok_or(DemError::UnterminatedToken)?;
    Ok((len_at, start, start + nul))
}

/// Reads the game-directory token embedded in the signon payload.
pub fn read_game_dir_token(data: &[u8]) -> Result<&str, DemError> {
    let (_, start, end) = locate_token(data)?;
    std::str::from_utf8(&data[start..end]).map_err(|_| DemError::InvalidString {
        field: "game_dir_token",
    })
}

/// Rewrites the embedded game-directory token.
///
/// The new bytes are spliced in place of the old token up to (not
/// including) its trailing NUL, and the length byte is adjusted by the
/// size delta. Everything from the NUL onwards is preserved unchanged,
/// so the total file length changes only by the token length delta.
pub fn patch_game_dir_token(data: &[u8], token: &str) -> Result<Vec<u8>, DemError> {
    let (len_at, start, end) = locate_token(data)?;

    let old_token_len = end - start;
    let new_len =
        data[len_at] as isize + token.len() as isize - old_token_len as isize;
    if !(0..=255).contains(&new_len) {
        return Err(DemError::TokenTooLong { len: token.len() });
    }

    let mut out = Vec::with_capacity(data.len() + token.len() - old_token_len);
    out.extend_from_slice(&data[..len_at]);
    out.push(new_len as u8);
    out.extend_from_slice(token.as_bytes());
    out.extend_from_slice(&data[end..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_with_token(sig: &[u8; 5], token: &str) -> Vec<u8> {
        let mut data = vec![0xAB; 64];
        data.extend_from_slice(sig);
        // Length byte covers the token, its NUL, and trailing message data.
        data.push(token.len() as u8 + 9);
        data.extend_from_slice(token.as_bytes());
        data.push(0);
        data.extend_from_slice(b"trailing");
        data
    }

    #[test]
    fn reads_embedded_token() {
        let data = demo_with_token(&GAME_DIR_ANCHORS[0], "tf");
        assert_eq!(read_game_dir_token(&data).unwrap(), "tf");
    }

    #[test]
    fn finds_fallback_anchor() {
        let data = demo_with_token(&GAME_DIR_ANCHORS[1], "hl2");
        assert_eq!(read_game_dir_token(&data).unwrap(), "hl2");
    }

    #[test]
    fn patch_round_trips_and_shifts_length_by_delta() {
        let data = demo_with_token(&GAME_DIR_ANCHORS[0], "tf");
        let token = "cfg/demrec_a1b2";

        let patched = patch_game_dir_token(&data, token).unwrap();
        assert_eq!(read_game_dir_token(&patched).unwrap(), token);
        assert_eq!(patched.len(), data.len() + token.len() - 2);

        // Bytes after the NUL terminator are untouched.
        assert!(patched.ends_with(b"trailing"));

        // Length byte moved by the same delta.
        let anchor = memmem::find(&patched, &GAME_DIR_ANCHORS[0]).unwrap();
        assert_eq!(
            patched[anchor + ANCHOR_LEN] as usize,
            2 + 9 + token.len() - 2
        );
    }

    #[test]
    fn patch_with_shorter_token_shrinks_file() {
        let data = demo_with_token(&GAME_DIR_ANCHORS[0], "garrysmod");
        let patched = patch_game_dir_token(&data, "tf").unwrap();
        assert_eq!(read_game_dir_token(&patched).unwrap(), "tf");
        assert_eq!(patched.len(), data.len() - 7);
    }

    #[test]
    fn missing_anchor_is_a_named_error() {
        let data = vec![0u8; 256];
        assert!(matches!(
            read_game_dir_token(&data),
            Err(DemError::AnchorNotFound)
        ));
        assert!(matches!(
            patch_game_dir_token(&data, "tf"),
            Err(DemError::AnchorNotFound)
        ));
    }

    #[test]
    fn unterminated_token_is_rejected() {
        let mut data = vec![0x11; 32];
        data.extend_from_slice(&GAME_DIR_ANCHORS[0]);
        data.push(4);
        data.extend_from_slice(b"tf"); // no NUL follows
        assert!(matches!(
            read_game_dir_token(&data),
            Err(DemError::UnterminatedToken)
        ));
    }

    #[test]
    fn oversized_replacement_is_rejected() {
        let data = demo_with_token(&GAME_DIR_ANCHORS[0], "tf");
        let huge = "x".repeat(300);
        assert!(matches!(
            patch_game_dir_token(&data, &huge),
            Err(DemError::TokenTooLong { .. })
        ));
    }
}
