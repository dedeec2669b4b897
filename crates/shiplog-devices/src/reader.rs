//! Reads one variable's registers from its source.

use tracing::debug;

use shiplog_core::model::{Source, Variable};

use crate::client::{DynRegisterClient, RegisterRequest};
use crate::error::{DeviceError, DeviceResult};

/// Issues one fresh register session per variable.
#[derive(Clone)]
pub struct DeviceReader {
    client: DynRegisterClient,
    unit_id: u8,
}

impl DeviceReader {
    pub fn new(client: DynRegisterClient, unit_id: u8) -> Self {
        Self { client, unit_id }
    }

    /// Read `register_count` holding registers starting at `start_address`.
    ///
    /// The result always has exactly `register_count` words.
    pub async fn read_variable(
        &self,
        source: &Source,
        equipment_name: &str,
        variable: &Variable,
    ) -> DeviceResult<Vec<u16>> {
        if variable.register_count == 0 {
            return Err(DeviceError::InvalidRequest(format!(
                "variable '{}' has RegisterCount 0",
                variable.name
            )));
        }

        let request = RegisterRequest {
            unit_id: self.unit_id,
            start: variable.start_address,
            count: variable.register_count,
        };

        debug!(
            source = %source.name,
            endpoint = %source.endpoint(),
            equipment = %equipment_name,
            variable = %variable.name,
            start = request.start,
            count = request.count,
            "reading holding registers"
        );

        let words = self
            .client
            .read_holding_registers(&source.address, source.port, request)
            .await?;

        if words.len() != usize::from(request.count) {
            return Err(DeviceError::Protocol(format!(
                "expected {} registers, got {}",
                request.count,
                words.len()
            )));
        }

        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::client::RegisterClient;

    /// Records requests and answers with a fixed word list.
    struct FixedClient {
        words: Vec<u16>,
        seen: Mutex<Vec<(String, u16, RegisterRequest)>>,
    }

    #[async_trait]
    impl RegisterClient for FixedClient {
        async fn read_holding_registers(
            &self,
            address: &str,
            port: u16,
            request: RegisterRequest,
        ) -> DeviceResult<Vec<u16>> {
            self.seen
                .lock()
                .unwrap()
                .push((address.to_string(), port, request));
            Ok(self.words.clone())
        }
    }

    fn source() -> Source {
        Source {
            id: 1,
            name: "PLC-1".to_string(),
            address: "10.0.0.5".to_string(),
            port: 5020,
        }
    }

    fn variable(start_address: u16, register_count: u16) -> Variable {
        Variable {
            id: 7,
            name: "RPM".to_string(),
            alias: String::new(),
            start_address,
            register_count,
            equipment_id: 1,
        }
    }

    #[tokio::test]
    async fn test_request_uses_source_and_variable() {
        let client = Arc::new(FixedClient {
            words: vec![0x0000, 0x3F80],
            seen: Mutex::new(Vec::new()),
        });
        let reader = DeviceReader::new(client.clone(), 3);

        let words = reader
            .read_variable(&source(), "Engine", &variable(40, 2))
            .await
            .unwrap();
        assert_eq!(words, vec![0x0000, 0x3F80]);

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (address, port, request) = &seen[0];
        assert_eq!(address, "10.0.0.5");
        assert_eq!(*port, 5020);
        assert_eq!(
            *request,
            RegisterRequest {
                unit_id: 3,
                start: 40,
                count: 2
            }
        );
    }

    #[tokio::test]
    async fn test_zero_count_is_rejected_without_io() {
        let client = Arc::new(FixedClient {
            words: Vec::new(),
            seen: Mutex::new(Vec::new()),
        });
        let reader = DeviceReader::new(client.clone(), 1);

        let err = reader
            .read_variable(&source(), "Engine", &variable(0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidRequest(_)));
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_response_is_protocol_error() {
        let client = Arc::new(FixedClient {
            words: vec![1],
            seen: Mutex::new(Vec::new()),
        });
        let reader = DeviceReader::new(client, 1);

        let err = reader
            .read_variable(&source(), "Engine", &variable(0, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Protocol(_)));
    }
}
