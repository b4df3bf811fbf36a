//! One-shot SDP announcement file (spec §6), written once the RTP sink
//! detects the stream's payload type and codec so an external decoder can
//! pick the session up.

use std::path::Path;

use crate::error::Result;
use crate::events::Codec;

/// Render the SDP body for one video stream.
pub fn render(port: u16, pt: u8, codec: Codec) -> String {
    format!(
        "v=0\r\n\
         o=- 0 0 IN IP4 127.0.0.1\r\n\
         s=No Name\r\n\
         c=IN IP4 127.0.0.1\r\n\
         t=0 0\r\n\
         m=video {port} RTP/AVP {pt}\r\n\
         a=rtpmap:{pt} {codec}/90000\r\n"
    )
}

/// Write the SDP announcement to `path`, overwriting any previous one.
pub fn write(path: &Path, port: u16, pt: u8, codec: Codec) -> Result<()> {
    std::fs::write(path, render(port, pt, codec))?;
    Ok(())
}
