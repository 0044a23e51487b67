use serde::{Deserialize, Serialize};

/// Where the RTP voice sink sends its packets.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SinkConfig {
    /// Remote `host:port` receiving RTP.
    pub address: String,
    /// Local bind address for the UDP socket.
    pub bind: String,
    /// RTP synchronisation source; 0 picks a random one per connection.
    pub ssrc: u32,
    pub mode: CryptoMode,
    /// 32-byte key, hex encoded. Required unless `mode = "none"`.
    pub secret_key: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:5004".to_string(),
            bind: "0.0.0.0:0".to_string(),
            ssrc: 0,
            mode: CryptoMode::None,
            secret_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CryptoMode {
    #[default]
    None,
    Xsalsa20Poly1305,
}
