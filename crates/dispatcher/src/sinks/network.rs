//! NetworkSink - 每个 batch 以 UDP datagram 发送
//!
//! Datagram 内容是 `{window, part, parts, records}` 信封，编码为 JSON 或
//! bincode。整批放不进一个 datagram 时按记录拆分。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;

use contracts::{BatchSink, BatchWindow, CanonicalRecord, ContractError, MicroBatch};
use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::{debug, instrument, trace, warn};

/// Largest payload that fits an IPv4 UDP datagram with some headroom
const DEFAULT_MAX_PACKET: usize = 65_000;

/// Datagram encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFormat {
    #[default]
    Json,
    Bincode,
}

impl NetworkFormat {
    fn encode<T: Serialize>(self, value: &T) -> Result<Vec<u8>, String> {
        match self {
            Self::Json => serde_json::to_vec(value).map_err(|e| e.to_string()),
            Self::Bincode => bincode::serialize(value).map_err(|e| e.to_string()),
        }
    }
}

impl FromStr for NetworkFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "bincode" => Ok(Self::Bincode),
            other => Err(format!("unknown format '{other}', expected json or bincode")),
        }
    }
}

/// `[sinks.params]` for a network sink: `addr`, `format`, `max_packet_size`
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    pub addr: SocketAddr,
    pub format: NetworkFormat,
    pub max_packet_size: usize,
}

impl NetworkSinkConfig {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr = params
            .get("addr")
            .ok_or("missing 'addr'")?
            .parse::<SocketAddr>()
            .map_err(|e| format!("bad 'addr': {e}"))?;
        let format = params
            .get("format")
            .map(|f| f.parse::<NetworkFormat>())
            .transpose()?
            .unwrap_or_default();
        let max_packet_size = match params.get("max_packet_size") {
            Some(v) => v.parse().map_err(|e| format!("bad 'max_packet_size': {e}"))?,
            None => DEFAULT_MAX_PACKET,
        };

        Ok(Self {
            addr,
            format,
            max_packet_size,
        })
    }
}

#[derive(Debug, Serialize)]
struct Datagram<'a> {
    window: BatchWindow,
    part: usize,
    parts: usize,
    records: &'a [CanonicalRecord],
}

/// Sends each batch to a fixed UDP peer
///
/// A single record that does not fit one datagram is skipped with a warning.
/// Send errors fail the batch so the scheduler retries it.
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    socket: Option<UdpSocket>,
}

impl NetworkSink {
    #[instrument(name = "network_sink_new", skip(name, config), fields(addr = %config.addr))]
    pub async fn new(name: impl Into<String>, config: NetworkSinkConfig) -> std::io::Result<Self> {
        let name = name.into();
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(config.addr).await?;
        debug!(sink = %name, format = ?config.format, "udp peer set");

        Ok(Self {
            name,
            config,
            socket: Some(socket),
        })
    }

    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|e| ContractError::config_validation(format!("sinks[{name}].params"), e))?;

        Self::new(name.clone(), config)
            .await
            .map_err(|e| ContractError::SinkConnection {
                sink_name: name,
                message: e.to_string(),
            })
    }

    fn encode(&self, datagram: &Datagram<'_>) -> Result<Vec<u8>, ContractError> {
        self.config
            .format
            .encode(datagram)
            .map_err(|e| ContractError::sink_write(&self.name, format!("encode failed: {e}")))
    }

    /// One datagram for the batch, or one per record when it does not fit
    fn prepare_payloads(&self, batch: &MicroBatch) -> Result<Vec<Vec<u8>>, ContractError> {
        let whole = self.encode(&Datagram {
            window: batch.window,
            part: 0,
            parts: 1,
            records: &batch.records,
        })?;
        let limit = self.config.max_packet_size;
        if whole.len() <= limit {
            return Ok(vec![whole]);
        }

        let parts = batch.len();
        debug!(sink = %self.name, bytes = whole.len(), limit, parts, "splitting batch");

        let mut payloads = Vec::with_capacity(parts);
        for (part, record) in batch.records.iter().enumerate() {
            let data = self.encode(&Datagram {
                window: batch.window,
                part,
                parts,
                records: std::slice::from_ref(record),
            })?;
            if data.len() > limit {
                warn!(sink = %self.name, id = %record.id, bytes = data.len(), limit, "record exceeds datagram limit, skipped");
                continue;
            }
            payloads.push(data);
        }
        Ok(payloads)
    }
}

impl BatchSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "network_sink_on_batch",
        skip(self, batch),
        fields(sink = %self.name, seq = batch.sequence_number())
    )]
    async fn on_batch(&mut self, batch: &MicroBatch) -> Result<(), ContractError> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| ContractError::sink_write(&self.name, "sink is closed"))?;

        for data in self.prepare_payloads(batch)? {
            let sent = socket
                .send(&data)
                .await
                .map_err(|e| ContractError::sink_write(&self.name, format!("udp send: {e}")))?;
            trace!(bytes = sent, "datagram sent");
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        if self.socket.take().is_some() {
            debug!(sink = %self.name, "network sink closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use contracts::SourceTag;

    fn batch(records: usize) -> MicroBatch {
        let records = (0..records)
            .map(|i| CanonicalRecord {
                id: i.to_string(),
                author: "bob".to_string(),
                text: "x".repeat(200),
                created_at: Utc.timestamp_millis_opt(0).unwrap(),
                lang: None,
                hashtags: Vec::new(),
                source: SourceTag::Live,
                ingested_at_ms: 0,
            })
            .collect();
        MicroBatch::new(
            BatchWindow {
                sequence_number: 9,
                start_ms: 0,
                end_ms: 5_000,
            },
            records,
        )
    }

    #[test]
    fn test_params_parsed_and_checked() {
        let mut params = HashMap::from([
            ("addr".to_string(), "127.0.0.1:9999".to_string()),
            ("format".to_string(), "bincode".to_string()),
        ]);

        let config = NetworkSinkConfig::from_params(&params).unwrap();
        assert_eq!(config.addr.port(), 9999);
        assert_eq!(config.format, NetworkFormat::Bincode);
        assert_eq!(config.max_packet_size, DEFAULT_MAX_PACKET);

        params.insert("max_packet_size".to_string(), "lots".to_string());
        assert!(NetworkSinkConfig::from_params(&params).unwrap_err().contains("max_packet_size"));

        params.insert("max_packet_size".to_string(), "1200".to_string());
        params.insert("format".to_string(), "xml".to_string());
        assert!(NetworkSinkConfig::from_params(&params).is_err());

        params.remove("addr");
        assert!(NetworkSinkConfig::from_params(&params).is_err());
    }

    #[tokio::test]
    async fn test_batch_fits_one_json_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = NetworkSinkConfig {
            addr: receiver.local_addr().unwrap(),
            format: NetworkFormat::Json,
            max_packet_size: DEFAULT_MAX_PACKET,
        };

        let mut sink = NetworkSink::new("test_net", config).await.unwrap();
        sink.on_batch(&batch(2)).await.unwrap();

        let mut buf = vec![0u8; 65536];
        let n = receiver.recv(&mut buf).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(value["window"]["sequence_number"], 9);
        assert_eq!(value["parts"], 1);
        assert_eq!(value["records"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_oversized_batch_split_per_record() {
        let config = NetworkSinkConfig {
            addr: "127.0.0.1:19998".parse().unwrap(),
            format: NetworkFormat::Json,
            max_packet_size: 600,
        };
        let sink = NetworkSink::new("test_net", config).await.unwrap();

        let payloads = sink.prepare_payloads(&batch(5)).unwrap();
        assert_eq!(payloads.len(), 5);
        assert!(payloads.iter().all(|p| p.len() <= 600));
    }

    #[tokio::test]
    async fn test_closed_sink_rejects_batches() {
        let config = NetworkSinkConfig {
            addr: "127.0.0.1:19997".parse().unwrap(),
            format: NetworkFormat::Bincode,
            max_packet_size: DEFAULT_MAX_PACKET,
        };
        let mut sink = NetworkSink::new("test_net", config).await.unwrap();
        sink.close().await.unwrap();
        assert!(sink.on_batch(&batch(1)).await.is_err());
    }
}
