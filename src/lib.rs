/*! Ground-station receive engine for an open-source FPV digital video link.

A USB Wi-Fi adapter in monitor mode hands this crate raw 802.11 frames
carrying the "wfb" broadcast protocol. This crate de-encapsulates,
authenticates, decrypts and FEC-recovers the RTP video stream inside, and
emits it on a local UDP socket, while a secondary adaptive-link uplink
reports received signal quality back to the transmitter.

# Architecture overview

Frames flow through five cooperating pieces, run synchronously on a single
RX thread (no lock needed, single writer):

```text
  [ radio driver callback ]
            |
    [ frame classifier ]       strip radiotap, match channel ID
            |
     [ session layer ]         KEY packets establish the AEAD session
            |
   [ block aggregator ]        decrypt, place fragments, Reed-Solomon
            |                  recovery, in-order delivery
      [ RTP sink ]              UDP loopback to the video decoder
```

A second, independently-started thread (the [`adaptive_link`] controller)
reads a shared [`signal_quality`] estimator ten times a second and sends FEC
hints and telemetry back over the uplink.

[`supervisor::Supervisor`] owns device lifecycle and thread composition; it
is the crate's top-level entry point. See `src/bin/wfb-rx.rs` for a CLI
wrapper, and `tests/scenarios.rs` for the reference scenarios this engine is
built to satisfy.
*/
#![warn(missing_docs)]

pub mod aggregator;
pub mod channel;
pub mod classifier;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod events;
pub mod fec;
pub mod radiotap;
pub mod ring;
pub mod rtp;
pub mod sdp;
pub mod session;
pub mod signal_quality;
pub mod supervisor;

pub mod adaptive_link;
pub mod engine;

pub use error::{Error, Result};
