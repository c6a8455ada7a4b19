use crate::core::network::SensorNetwork;
use crate::domain::model::{Node, Payload, PayloadData};
use crate::utils::error::{Result, SensorNetError};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyReport {
    pub nodes: Vec<NodeReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub node: Node,
    pub payloads: Vec<PayloadReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadReport {
    pub payload: Payload,
    pub count: u8,
    pub info: Option<String>,
    pub data: Option<PayloadData>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Discovers the network and queries every payload (index 0) of every node.
pub async fn survey(network: &SensorNetwork, discovery_timeout: Duration) -> Result<SurveyReport> {
    network.discover(discovery_timeout).await?;
    let nodes = network.nodes();
    tracing::info!("Nodes connected: {}", nodes.len());

    let mut reports = Vec::with_capacity(nodes.len());
    for node in nodes {
        let io = match network.get_node_io(&node).await {
            Ok(io) => io,
            Err(e) => {
                let error = recoverable(e)?;
                reports.push(NodeReport {
                    node,
                    payloads: Vec::new(),
                    error: Some(error),
                });
                continue;
            }
        };

        let mut payloads = Vec::with_capacity(io.len());
        for (payload, count) in io {
            let mut report = PayloadReport {
                payload,
                count,
                info: None,
                data: None,
                errors: Vec::new(),
            };

            match network.get_payload_info(&node, payload, 0).await {
                Ok(info) => report.info = Some(String::from_utf8_lossy(&info).into_owned()),
                Err(e) => report.errors.push(recoverable(e)?),
            }
            if !payload.is_sink() {
                match network.get_data(&node, payload, 0).await {
                    Ok(data) => report.data = Some(data),
                    Err(e) => report.errors.push(recoverable(e)?),
                }
            }
            payloads.push(report);
        }

        reports.push(NodeReport {
            node,
            payloads,
            error: None,
        });
    }

    Ok(SurveyReport { nodes: reports })
}

/// Runs [`survey`] and then stops the network. The survey's outcome wins; a
/// failure while closing the link is only logged.
pub async fn survey_and_stop(
    network: &SensorNetwork,
    discovery_timeout: Duration,
) -> Result<SurveyReport> {
    let result = survey(network, discovery_timeout).await;
    if let Err(e) = network.stop().await {
        tracing::warn!("Failed to close the radio link: {}", e);
    }
    result
}

/// Keeps per-request failures in the report; a dead link ends the survey.
fn recoverable(err: SensorNetError) -> Result<String> {
    match err {
        SensorNetError::Disconnected | SensorNetError::IoError(_) => Err(err),
        other => {
            tracing::warn!("{}", other);
            Ok(other.to_string())
        }
    }
}

impl fmt::Display for SurveyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.nodes.iter().map(|n| n.node.to_string()).collect();
        writeln!(f, "Nodes connected: [{}]", names.join(", "))?;

        for (idx, node) in self.nodes.iter().enumerate() {
            if let Some(error) = &node.error {
                writeln!(f, "Node {} failed: {}", idx, error)?;
                continue;
            }
            for report in &node.payloads {
                writeln!(f, "Node {} has - {}: {}", idx, report.payload, report.count)?;
                if let Some(info) = &report.info {
                    writeln!(f, "Payload reports it is: {}", info)?;
                }
                if let Some(data) = &report.data {
                    writeln!(f, "Data: {}", data)?;
                }
                for error in &report.errors {
                    writeln!(f, "Error: {}", error)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::network::NetworkSettings;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

    /// Transport whose shutdown always fails.
    struct StuckPort(DuplexStream);

    impl AsyncRead for StuckPort {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for StuckPort {
        fn poll_write(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.get_mut().0).poll_write(cx, buf)
        }

        fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.get_mut().0).poll_flush(cx)
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "port stuck")))
        }
    }

    #[tokio::test]
    async fn test_report_survives_failed_close() {
        let (ours, _radio) = tokio::io::duplex(1024);
        let network = SensorNetwork::new(StuckPort(ours), NetworkSettings::default());

        let report = survey_and_stop(&network, Duration::ZERO).await.unwrap();
        assert!(report.nodes.is_empty());
        assert!(matches!(
            network.discover(Duration::ZERO).await,
            Err(SensorNetError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_survey_error_is_not_masked_by_close() {
        let (ours, radio) = tokio::io::duplex(1024);
        drop(radio);
        let network = SensorNetwork::new(StuckPort(ours), NetworkSettings::default());

        let err = survey_and_stop(&network, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, SensorNetError::IoError(ref e) if e.kind() != io::ErrorKind::Other));
    }

    #[test]
    fn test_report_renders_like_the_console_routine() {
        let report = SurveyReport {
            nodes: vec![NodeReport {
                node: Node::new([0, 0, 0, 0, 0, 0, 0, 7], "TEMP"),
                payloads: vec![PayloadReport {
                    payload: Payload::Analogue2Byte,
                    count: 1,
                    info: Some("thermistor".to_string()),
                    data: Some(PayloadData::Analogue(512)),
                    errors: Vec::new(),
                }],
                error: None,
            }],
        };

        let text = report.to_string();
        assert_eq!(
            text,
            "Nodes connected: [Node(0000000000000007:TEMP)]\n\
             Node 0 has - ANALOGUE_2BYTE: 1\n\
             Payload reports it is: thermistor\n\
             Data: 512 (analogue)\n"
        );
    }

    #[test]
    fn test_report_json_shape() {
        let report = SurveyReport {
            nodes: vec![NodeReport {
                node: Node::new([0, 0, 0, 0, 0, 0, 0, 7], "SW"),
                payloads: vec![PayloadReport {
                    payload: Payload::DigitalInput,
                    count: 2,
                    info: None,
                    data: None,
                    errors: vec!["boom".to_string()],
                }],
                error: None,
            }],
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["nodes"][0]["node"]["long_addr"], "0000000000000007");
        assert_eq!(json["nodes"][0]["payloads"][0]["payload"], "DIGITAL_INPUT");
        assert_eq!(json["nodes"][0]["payloads"][0]["errors"][0], "boom");
        assert!(json["nodes"][0].get("error").is_none());
    }

    #[test]
    fn test_timeouts_are_recorded_not_fatal() {
        let timeout = SensorNetError::Timeout {
            what: "DATA_RESPONSE".to_string(),
            after: Duration::from_secs(1),
        };
        assert!(recoverable(timeout).is_ok());
        assert!(recoverable(SensorNetError::Disconnected).is_err());
    }
}
