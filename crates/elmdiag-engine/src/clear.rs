//! Clear-codes operation

use elmdiag_core::ClearOutcome;

use crate::codec::{decode_mode03, parse_reply, service_id, DtcRead, ServiceReply};
use crate::config::ScanConfig;
use crate::elm::ElmAdapter;
use crate::error::{ScanError, ScanResult};
use crate::uds::{request, UdsClient};

/// Clear stored codes with Mode 04 and UDS 0x14, then read back
///
/// Either clear being acknowledged (or answered with "no data") counts as
/// success. Codes still present on the verification read are reported as
/// persistent, not as an error.
pub async fn clear_codes(elm: &ElmAdapter, config: &ScanConfig) -> ScanResult<ClearOutcome> {
    if !elm.transport().is_connected().await {
        return Err(ScanError::TransportUnavailable(
            "adapter not connected".to_string(),
        ));
    }

    let mut outcome = ClearOutcome::default();
    elm.select_broadcast(config.config_timeout()).await;

    match elm
        .send(&request(&[service_id::OBD_CLEAR_DTCS]), config.clear_timeout())
        .await
    {
        Ok(text) => match parse_reply(&text, service_id::OBD_CLEAR_DTCS) {
            reply if reply.is_success_or_no_data() => {
                outcome.obd_cleared = true;
                elm.trace("Mode 04 clear acknowledged");
            }
            ServiceReply::Negative(negative) => elm.trace(&format!("Mode 04 {}", negative)),
            other => elm.trace(&format!("Mode 04 not acknowledged: {:?}", other)),
        },
        Err(e) => elm.trace(&format!("Mode 04 failed: {}", e)),
    }

    if config.uds_enabled {
        match UdsClient::new(elm, config).clear_all().await {
            Ok(reply) if reply.is_success_or_no_data() => {
                outcome.uds_cleared = true;
                elm.trace("UDS clear acknowledged");
            }
            Ok(ServiceReply::Negative(negative)) => {
                elm.trace(&format!("UDS clear {}", negative));
                outcome.uds_rejection = Some(negative.nrc.description().to_string());
            }
            Ok(other) => elm.trace(&format!("UDS clear not acknowledged: {:?}", other)),
            Err(e) => elm.trace(&format!("UDS clear failed: {}", e)),
        }
    }

    elm.select_broadcast(config.config_timeout()).await;
    tokio::time::sleep(config.clear_settle()).await;

    match elm
        .send(&request(&[service_id::OBD_STORED_DTCS]), config.mode03_timeout())
        .await
    {
        Ok(text) => {
            if let DtcRead::Codes(codes) = decode_mode03(&text) {
                elm.trace(&format!("{} code(s) persist after clear", codes.len()));
                outcome.persistent = codes;
            }
        }
        Err(e) => elm.trace(&format!("Verification read after clear failed: {}", e)),
    }

    tracing::info!(
        obd = outcome.obd_cleared,
        uds = outcome.uds_cleared,
        persistent = outcome.persistent.len(),
        "Clear finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use elmdiag_core::LogBuffer;
    use std::sync::Arc;

    fn fast_config() -> ScanConfig {
        ScanConfig {
            clear_settle_ms: 0,
            ..ScanConfig::default()
        }
    }

    #[tokio::test]
    async fn test_nothing_to_clear() {
        let mock = Arc::new(MockTransport::new());
        let elm = ElmAdapter::new(mock.clone());

        let outcome = clear_codes(&elm, &fast_config()).await.unwrap();

        assert!(outcome.obd_cleared);
        assert!(outcome.uds_cleared);
        assert!(outcome.persistent.is_empty());
        assert!(outcome.success());
        assert_eq!(
            mock.sent_commands(),
            vec!["ATSH7DF", "ATCRA", "04", "14FFFFFF", "ATSH7DF", "ATCRA", "03"]
        );
    }

    #[tokio::test]
    async fn test_uds_rejection_is_not_failure() {
        let mock = Arc::new(MockTransport::new());
        mock.on("04", "44").on("14FFFFFF", "7F 14 22").on("03", "43 01 04 20");
        let log = Arc::new(LogBuffer::new());
        let elm = ElmAdapter::new(mock.clone()).with_log(log.clone());

        let outcome = clear_codes(&elm, &fast_config()).await.unwrap();

        assert!(outcome.success());
        assert!(!outcome.uds_cleared);
        assert_eq!(outcome.uds_rejection.as_deref(), Some("Conditions Not Correct"));
        assert_eq!(outcome.persistent[0].code.as_str(), "P0420");
        assert!(log.contains("persist after clear"));
    }

    #[tokio::test]
    async fn test_disconnected_adapter() {
        let mock = Arc::new(MockTransport::new());
        mock.set_connected(false);
        let elm = ElmAdapter::new(mock.clone());

        let err = clear_codes(&elm, &fast_config()).await.unwrap_err();
        assert!(matches!(err, ScanError::TransportUnavailable(_)));
    }
}
