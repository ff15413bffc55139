/*!
Bounded hex dumps for trace logging.
*/

use std::fmt;

use crate::core::constants::HEX_PREVIEW_BYTES;

/// Displays at most the first [`HEX_PREVIEW_BYTES`] bytes of a payload.
pub struct HexPreview<'a>(pub &'a [u8]);

impl fmt::Display for HexPreview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = &self.0[..self.0.len().min(HEX_PREVIEW_BYTES)];
        for (i, byte) in shown.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        if self.0.len() > shown.len() {
            write!(f, " ..(+{})", self.0.len() - shown.len())?;
        }
        Ok(())
    }
}
