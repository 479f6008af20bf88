//! UDS requests issued through the adapter

use std::time::Duration;

use crate::codec::{
    decode_uds_dtcs, parse_reply, service_id, sub_function, DtcRead, ServiceReply,
};
use crate::config::ScanConfig;
use crate::elm::ElmAdapter;
use crate::transport::TransportError;

/// Hex request text as sent to the adapter
pub fn request(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

pub fn read_dtc_by_status_mask_request(mask: u8) -> String {
    request(&[
        service_id::READ_DTC_INFORMATION,
        sub_function::REPORT_DTC_BY_STATUS_MASK,
        mask,
    ])
}

pub fn clear_all_dtcs_request() -> String {
    let [_, high, mid, low] = sub_function::ALL_DTC_GROUPS.to_be_bytes();
    request(&[service_id::CLEAR_DIAGNOSTIC_INFORMATION, high, mid, low])
}

/// Diagnostic session actually entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdsSession {
    Extended,
    Default,
}

/// UDS service layer on top of [`ElmAdapter`]
pub struct UdsClient<'a> {
    elm: &'a ElmAdapter,
    config: &'a ScanConfig,
}

impl<'a> UdsClient<'a> {
    pub fn new(elm: &'a ElmAdapter, config: &'a ScanConfig) -> Self {
        Self { elm, config }
    }

    async fn positive(&self, bytes: &[u8], timeout: Duration) -> bool {
        let service = bytes[0];
        match self.elm.send(&request(bytes), timeout).await {
            Ok(text) => matches!(parse_reply(&text, service), ServiceReply::Positive(_)),
            Err(e) => {
                tracing::debug!(service = %format!("0x{:02X}", service), error = %e, "UDS request failed");
                false
            }
        }
    }

    /// Enter the extended session, falling back to the default session
    ///
    /// `None` when neither is acknowledged; callers carry on regardless.
    pub async fn open_session(&self) -> Option<UdsSession> {
        let timeout = self.config.session_timeout();
        let extended = [
            service_id::DIAGNOSTIC_SESSION_CONTROL,
            sub_function::EXTENDED_SESSION,
        ];
        if self.positive(&extended, timeout).await {
            return Some(UdsSession::Extended);
        }
        let default = [
            service_id::DIAGNOSTIC_SESSION_CONTROL,
            sub_function::DEFAULT_SESSION,
        ];
        if self.positive(&default, timeout).await {
            return Some(UdsSession::Default);
        }
        None
    }

    /// Tester present (0x3E 0x00) to keep the session alive
    pub async fn tester_present(&self) -> bool {
        let request = [service_id::TESTER_PRESENT, sub_function::TESTER_PRESENT_ZERO];
        self.positive(&request, self.config.keepalive_timeout()).await
    }

    /// ReadDTCInformation, report DTC by status mask
    pub async fn read_dtcs(&self, mask: u8, timeout: Duration) -> Result<DtcRead, TransportError> {
        let text = self
            .elm
            .send(&read_dtc_by_status_mask_request(mask), timeout)
            .await?;
        Ok(decode_uds_dtcs(&text))
    }

    /// ClearDiagnosticInformation for every DTC group
    pub async fn clear_all(&self) -> Result<ServiceReply, TransportError> {
        let text = self
            .elm
            .send(&clear_all_dtcs_request(), self.config.clear_timeout())
            .await?;
        Ok(parse_reply(&text, service_id::CLEAR_DIAGNOSTIC_INFORMATION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::sync::Arc;

    #[test]
    fn test_request_text() {
        assert_eq!(read_dtc_by_status_mask_request(0x08), "190208");
        assert_eq!(read_dtc_by_status_mask_request(0xFF), "1902FF");
        assert_eq!(clear_all_dtcs_request(), "14FFFFFF");
    }

    #[tokio::test]
    async fn test_open_session_prefers_extended() {
        let mock = Arc::new(MockTransport::new());
        mock.on("1003", "50 03 00 32 01 F4");
        let elm = ElmAdapter::new(mock.clone());
        let config = ScanConfig::default();

        let session = UdsClient::new(&elm, &config).open_session().await;

        assert_eq!(session, Some(UdsSession::Extended));
        assert_eq!(mock.sent_commands(), vec!["1003"]);
    }

    #[tokio::test]
    async fn test_open_session_falls_back_to_default() {
        let mock = Arc::new(MockTransport::new());
        mock.on("1003", "7F 10 12").on("1001", "50 01 00 32 01 F4");
        let elm = ElmAdapter::new(mock.clone());
        let config = ScanConfig::default();

        let session = UdsClient::new(&elm, &config).open_session().await;

        assert_eq!(session, Some(UdsSession::Default));
        assert_eq!(mock.sent_commands(), vec!["1003", "1001"]);
    }

    #[tokio::test]
    async fn test_open_session_neither_acknowledged() {
        let mock = Arc::new(MockTransport::new());
        let elm = ElmAdapter::new(mock.clone());
        let config = ScanConfig::default();

        assert_eq!(UdsClient::new(&elm, &config).open_session().await, None);
    }

    #[tokio::test]
    async fn test_read_dtcs_decodes_records() {
        let mock = Arc::new(MockTransport::new());
        mock.on("19 02 08", "59 02 FF 04 20 00 08");
        let elm = ElmAdapter::new(mock.clone());
        let config = ScanConfig::default();

        let read = UdsClient::new(&elm, &config)
            .read_dtcs(0x08, config.uds_timeout())
            .await
            .unwrap();

        assert_eq!(read.codes()[0].code.as_str(), "P0420");
        assert_eq!(read.codes()[0].status_byte, Some(0x08));
    }
}
