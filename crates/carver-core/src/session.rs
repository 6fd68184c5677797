//! Session identifier generation.

use rand::RngCore;
use rand::rngs::OsRng;

/// Number of random bytes backing a session identifier.
const SESSION_ID_BYTES: usize = 32;

/// Generate a new carve session identifier.
///
/// The session id is the sole credential for block uploads, so it is drawn
/// from the OS CSPRNG and hex-encoded (64 characters).
pub fn generate_session_id() -> String {
    let mut buf = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}
