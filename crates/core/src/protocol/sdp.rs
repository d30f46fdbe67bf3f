//! Out-of-band parameter sets carried in SDP `a=fmtp` attributes.
//!
//! ```text
//! a=fmtp:96 packetization-mode=1;profile-level-id=42e01f;sprop-parameter-sets=Z0LgH9kA,aM4G4g==   (RFC 6184 §8.1)
//! a=fmtp:96 sprop-vps=QAEM...;sprop-sps=QgEB...;sprop-pps=RAHA...                              (RFC 7798 §7.1)
//! ```
//!
//! Each value is a comma-separated list of base64-encoded NAL units. The
//! decoded units are fed to the frame assembler so that the first key frame
//! can be prefixed even when the server never repeats them in-band.

use base64::prelude::{BASE64_STANDARD, Engine as _};

use crate::media::Codec;

/// Look up one `name=value` parameter of an fmtp string (case-insensitive
/// name, whitespace around separators ignored).
pub fn fmtp_parameter<'a>(fmtp: &'a str, name: &str) -> Option<&'a str> {
    fmtp.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

/// Decode the out-of-band parameter sets for `codec`, in the order a key
/// frame should carry them. Entries that are not valid base64 are skipped.
pub fn parameter_sets(codec: Codec, fmtp: &str) -> Vec<Vec<u8>> {
    let names: &[&str] = match codec {
        Codec::H264 => &["sprop-parameter-sets"],
        Codec::H265 => &["sprop-vps", "sprop-sps", "sprop-pps"],
        Codec::Jpeg => &[],
    };

    let mut units = Vec::new();
    for name in names {
        let Some(value) = fmtp_parameter(fmtp, name) else {
            continue;
        };
        for encoded in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match BASE64_STANDARD.decode(encoded) {
                Ok(unit) if !unit.is_empty() => units.push(unit),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(parameter = name, error = %e, "undecodable parameter set in fmtp");
                }
            }
        }
    }
    units
}
