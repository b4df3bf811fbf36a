//! Session layer, spec §4.B: KEY packet handling, per-session AEAD key
//! derivation, epoch tracking.

use crate::channel::ChannelId;
use crate::constants::{KEY_SEALED_SIZE, SESSION_NONCE_SIZE, WSESSION_DATA_SIZE};
use crate::error::{Error, Result};
use chacha20poly1305::{
    ChaCha20Poly1305, Key as DataKey,
    aead::{Aead, KeyInit},
};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
#[cfg(test)]
use crypto_box::aead::AeadCore;

/// Reed-Solomon matrix family named in a KEY packet. Only Vandermonde is
/// supported; anything else fails the session (spec §4.B, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FecType {
    /// Vandermonde-matrix Reed-Solomon: the only supported scheme.
    Vandermonde,
    /// Any other on-wire value.
    Unsupported(u8),
}

impl FecType {
    fn from_byte(b: u8) -> Self {
        match b {
            0x1 => FecType::Vandermonde,
            other => FecType::Unsupported(other),
        }
    }

    #[cfg(test)]
    fn to_byte(self) -> u8 {
        match self {
            FecType::Vandermonde => 0x1,
            FecType::Unsupported(b) => b,
        }
    }
}

/// Long-term keypair loaded from the 64-byte keypair file (spec §6):
/// receiver secret key ‖ transmitter public key.
pub struct KeyMaterial {
    salsa_box: SalsaBox,
}

impl KeyMaterial {
    /// Parse a 64-byte keypair file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != crate::constants::KEYPAIR_FILE_SIZE {
            return Err(Error::BadKey(format!(
                "expected {} bytes, got {}",
                crate::constants::KEYPAIR_FILE_SIZE,
                bytes.len()
            )));
        }
        let sk_rx = SecretKey::from(<[u8; 32]>::try_from(&bytes[0..32]).unwrap());
        let pk_tx = PublicKey::from(<[u8; 32]>::try_from(&bytes[32..64]).unwrap());
        Ok(Self {
            salsa_box: SalsaBox::new(&pk_tx, &sk_rx),
        })
    }

    /// Load from a keypair file on disk.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).map_err(|e| Error::BadKey(format!("{}: {e}", path.display())))?;
        Self::from_bytes(&bytes)
    }
}

/// Decoded `KEY` packet session parameters.
#[derive(Debug, Clone)]
struct WsessionData {
    epoch: u64,
    channel_id: u32,
    fec_type: FecType,
    k: u8,
    n: u8,
    session_key: [u8; 32],
}

impl WsessionData {
    fn parse(plaintext: &[u8]) -> Result<Self> {
        if plaintext.len() != WSESSION_DATA_SIZE {
            return Err(Error::BadFraming);
        }
        let epoch = u64::from_be_bytes(plaintext[0..8].try_into().unwrap());
        let channel_id = u32::from_be_bytes(plaintext[8..12].try_into().unwrap());
        let fec_type = FecType::from_byte(plaintext[12]);
        let k = plaintext[13];
        let n = plaintext[14];
        // plaintext[15] is reserved padding.
        let mut session_key = [0u8; 32];
        session_key.copy_from_slice(&plaintext[16..48]);
        Ok(Self {
            epoch,
            channel_id,
            fec_type,
            k,
            n,
            session_key,
        })
    }

    /// Serialize, for tests and for a transmitter-side test harness.
    #[cfg(test)]
    fn serialize(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(WSESSION_DATA_SIZE);
        v.extend_from_slice(&self.epoch.to_be_bytes());
        v.extend_from_slice(&self.channel_id.to_be_bytes());
        v.push(self.fec_type.to_byte());
        v.push(self.k);
        v.push(self.n);
        v.push(0);
        v.extend_from_slice(&self.session_key);
        v
    }
}

/// Established session parameters for one channel.
#[derive(Debug, Clone, Default)]
pub struct Session {
    epoch: u64,
    session_key: Option<DataKey>,
    fec_k: u8,
    fec_n: u8,
    unsupported_fec_tipped: bool,
}

impl Session {
    /// Whether a `KEY` packet has ever been accepted.
    pub fn is_established(&self) -> bool {
        self.session_key.is_some()
    }

    /// Current epoch (0 until the first KEY is accepted).
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// FEC `(k, n)` parameters for the current session.
    pub fn fec_params(&self) -> (u8, u8) {
        (self.fec_k, self.fec_n)
    }
}

/// Whether accepting a `KEY` packet started a brand new session (ring must
/// be flushed, spec invariant 4) or just reconfirmed the existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    /// No session existed, or the epoch advanced: ring must be reset.
    New,
    /// Same epoch as before; nothing to reset.
    Unchanged,
}

/// Per-channel session state machine (spec §4.B).
pub struct SessionLayer {
    keys: KeyMaterial,
    channel_id: ChannelId,
    session: Session,
}

impl SessionLayer {
    /// Create a session layer bound to one channel, using the given
    /// long-term keypair.
    pub fn new(channel_id: ChannelId, keys: KeyMaterial) -> Self {
        Self {
            keys,
            channel_id,
            session: Session::default(),
        }
    }

    /// Current session snapshot.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Process a `KEY` packet body: `session_nonce(24B) ‖ sealed
    /// wsession_data`.
    pub fn on_key(&mut self, body: &[u8]) -> Result<SessionChange> {
        if body.len() != SESSION_NONCE_SIZE + KEY_SEALED_SIZE {
            return Err(Error::BadFraming);
        }
        let nonce = crypto_box::Nonce::from_slice(&body[0..SESSION_NONCE_SIZE]);
        let sealed = &body[SESSION_NONCE_SIZE..];
        let plaintext = self
            .keys
            .salsa_box
            .decrypt(nonce, sealed)
            .map_err(|_| Error::BadMac)?;
        let data = WsessionData::parse(&plaintext)?;

        if data.channel_id != self.channel_id.raw() {
            // Not meant for us; classifier routing should prevent this, but
            // a malformed/foreign KEY is simply dropped.
            return Err(Error::BadFraming);
        }
        if !matches!(data.fec_type, FecType::Vandermonde) {
            return Err(Error::UnsupportedFec);
        }
        if data.k == 0 || data.k > data.n {
            return Err(Error::BadFraming);
        }
        if data.epoch < self.session.epoch {
            return Err(Error::StaleEpoch);
        }

        let is_new = data.epoch > self.session.epoch || !self.session.is_established();
        self.session = Session {
            epoch: data.epoch,
            session_key: Some(*DataKey::from_slice(&data.session_key)),
            fec_k: data.k,
            fec_n: data.n,
            unsupported_fec_tipped: false,
        };
        Ok(if is_new {
            SessionChange::New
        } else {
            SessionChange::Unchanged
        })
    }

    /// Open a DATA packet's AEAD payload.
    ///
    /// `data_nonce` is the 64-bit `(block_idx << 8) | fragment_idx` value
    /// from spec §3; it is embedded, zero-extended, as the low 8 bytes of
    /// the 96-bit nonce ChaCha20-Poly1305 requires.
    pub fn open_data(&self, data_nonce: u64, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let key = self.session.session_key.as_ref().ok_or(Error::NoSession)?;
        let cipher = ChaCha20Poly1305::new(key);
        let mut nonce_bytes = [0u8; 12];
        nonce_bytes[4..12].copy_from_slice(&data_nonce.to_be_bytes());
        let nonce = chacha20poly1305::Nonce::from_slice(&nonce_bytes);
        cipher.decrypt(nonce, ciphertext).map_err(|_| Error::BadMac)
    }

    /// Emit the one-shot "unsupported FEC" tip at most once per session.
    pub fn take_unsupported_fec_tip(&mut self) -> bool {
        if self.session.unsupported_fec_tipped {
            false
        } else {
            self.session.unsupported_fec_tipped = true;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RadioPort;
    use crypto_box::aead::OsRng;

    fn keypair_file() -> (Vec<u8>, SecretKey, PublicKey) {
        let rx_secret = SecretKey::generate(&mut OsRng);
        let tx_secret = SecretKey::generate(&mut OsRng);
        let tx_public = tx_secret.public_key();
        let mut file = Vec::with_capacity(64);
        file.extend_from_slice(&rx_secret.to_bytes());
        file.extend_from_slice(tx_public.as_bytes());
        (file, tx_secret, rx_secret.public_key())
    }

    fn seal_key_packet(tx_secret: &SecretKey, rx_public: &PublicKey, data: &WsessionData) -> Vec<u8> {
        let salsa_box = SalsaBox::new(rx_public, tx_secret);
        let nonce = SalsaBox::generate_nonce(&mut OsRng);
        let ciphertext = salsa_box.encrypt(&nonce, data.serialize().as_ref()).unwrap();
        let mut body = Vec::with_capacity(SESSION_NONCE_SIZE + ciphertext.len());
        body.extend_from_slice(nonce.as_slice());
        body.extend_from_slice(&ciphertext);
        body
    }

    #[test]
    fn accepts_first_key_and_installs_session() {
        let (file, tx_secret, rx_public) = keypair_file();
        let channel = ChannelId::new(1, RadioPort::Video);
        let mut layer = SessionLayer::new(channel, KeyMaterial::from_bytes(&file).unwrap());
        let data = WsessionData {
            epoch: 1,
            channel_id: channel.raw(),
            fec_type: FecType::Vandermonde,
            k: 8,
            n: 12,
            session_key: [0x42; 32],
        };
        let body = seal_key_packet(&tx_secret, &rx_public, &data);
        assert_eq!(layer.on_key(&body).unwrap(), SessionChange::New);
        assert!(layer.session().is_established());
        assert_eq!(layer.session().fec_params(), (8, 12));
    }

    #[test]
    fn rejects_stale_epoch() {
        let (file, tx_secret, rx_public) = keypair_file();
        let channel = ChannelId::new(1, RadioPort::Video);
        let mut layer = SessionLayer::new(channel, KeyMaterial::from_bytes(&file).unwrap());
        let mk = |epoch| WsessionData {
            epoch,
            channel_id: channel.raw(),
            fec_type: FecType::Vandermonde,
            k: 8,
            n: 12,
            session_key: [0x01; 32],
        };
        layer.on_key(&seal_key_packet(&tx_secret, &rx_public, &mk(5))).unwrap();
        let err = layer
            .on_key(&seal_key_packet(&tx_secret, &rx_public, &mk(4)))
            .unwrap_err();
        assert!(matches!(err, Error::StaleEpoch));
        assert_eq!(layer.session().epoch(), 5);
    }

    #[test]
    fn rejects_unsupported_fec_type() {
        let (file, tx_secret, rx_public) = keypair_file();
        let channel = ChannelId::new(1, RadioPort::Video);
        let mut layer = SessionLayer::new(channel, KeyMaterial::from_bytes(&file).unwrap());
        let data = WsessionData {
            epoch: 1,
            channel_id: channel.raw(),
            fec_type: FecType::Unsupported(9),
            k: 8,
            n: 12,
            session_key: [0x01; 32],
        };
        let body = seal_key_packet(&tx_secret, &rx_public, &data);
        assert!(matches!(layer.on_key(&body), Err(Error::UnsupportedFec)));
        assert!(!layer.session().is_established());
    }

    #[test]
    fn data_round_trip() {
        let (file, tx_secret, rx_public) = keypair_file();
        let channel = ChannelId::new(1, RadioPort::Video);
        let mut layer = SessionLayer::new(channel, KeyMaterial::from_bytes(&file).unwrap());
        let data = WsessionData {
            epoch: 1,
            channel_id: channel.raw(),
            fec_type: FecType::Vandermonde,
            k: 8,
            n: 12,
            session_key: [0x07; 32],
        };
        layer
            .on_key(&seal_key_packet(&tx_secret, &rx_public, &data))
            .unwrap();

        let key = DataKey::from_slice(&data.session_key);
        let cipher = ChaCha20Poly1305::new(key);
        let data_nonce = (3u64 << 8) | 1;
        let mut nonce_bytes = [0u8; 12];
        nonce_bytes[4..12].copy_from_slice(&data_nonce.to_be_bytes());
        let nonce = chacha20poly1305::Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher.encrypt(nonce, b"hello fragment".as_ref()).unwrap();

        let plaintext = layer.open_data(data_nonce, &ciphertext).unwrap();
        assert_eq!(plaintext, b"hello fragment");
    }

    #[test]
    fn no_session_before_first_key() {
        let (file, _tx_secret, _rx_public) = keypair_file();
        let channel = ChannelId::new(1, RadioPort::Video);
        let layer = SessionLayer::new(channel, KeyMaterial::from_bytes(&file).unwrap());
        assert!(matches!(
            layer.open_data(0, &[0; 16]),
            Err(Error::NoSession)
        ));
    }
}
