//! Double-check pass
//!
//! Re-reads every module that reported codes and keeps only the codes seen
//! twice. Mode 03 findings are checked against a second Mode 03 read, UDS
//! findings against a second walk of the status masks. A re-read that fails
//! keeps every code it was meant to check.

use std::collections::HashSet;

use elmdiag_core::{DtcCode, DtcSource, EcuModule, ParsedDtc, VerificationResult};
use tracing::{debug, info};

use crate::codec::{decode_mode03, service_id, DtcRead};
use crate::config::ScanConfig;
use crate::elm::ElmAdapter;
use crate::uds::{request, UdsClient};

/// Findings grouped by module, in first-seen order
fn group_by_module(findings: &[ParsedDtc]) -> (Vec<ParsedDtc>, Vec<(EcuModule, Vec<ParsedDtc>)>) {
    let mut unattributed = Vec::new();
    let mut groups: Vec<(EcuModule, Vec<ParsedDtc>)> = Vec::new();

    for dtc in findings {
        match &dtc.module {
            None => unattributed.push(dtc.clone()),
            Some(module) => match groups.iter_mut().find(|(m, _)| m.id == module.id) {
                Some((_, list)) => list.push(dtc.clone()),
                None => groups.push((module.clone(), vec![dtc.clone()])),
            },
        }
    }
    (unattributed, groups)
}

/// Codes from a second Mode 03 read, or `None` when the read did not work
async fn reread_mode03(
    elm: &ElmAdapter,
    config: &ScanConfig,
    module: &EcuModule,
) -> Option<HashSet<DtcCode>> {
    let text = match elm
        .send(
            &request(&[service_id::OBD_STORED_DTCS]),
            config.double_check_timeout(),
        )
        .await
    {
        Ok(text) => text,
        Err(e) => {
            debug!(module = %module.id, error = %e, "Double-check read failed");
            return None;
        }
    };

    match decode_mode03(&text) {
        DtcRead::Codes(codes) => Some(codes.into_iter().map(|d| d.code).collect()),
        DtcRead::NoErrors => Some(HashSet::new()),
        other => {
            debug!(module = %module.id, result = ?other, "Double-check read unusable");
            None
        }
    }
}

/// Codes from a second walk of the status masks
///
/// Stops at the first mask that yields codes. `None` when no mask got a
/// positive answer.
async fn reread_uds(
    elm: &ElmAdapter,
    config: &ScanConfig,
    module: &EcuModule,
) -> Option<HashSet<DtcCode>> {
    let uds = UdsClient::new(elm, config);
    let mut answered = false;

    for (index, mask) in config.status_masks.iter().enumerate() {
        if index > 0 {
            uds.tester_present().await;
        }
        match uds.read_dtcs(mask.mask, config.double_check_timeout()).await {
            Ok(DtcRead::Codes(codes)) => {
                return Some(codes.into_iter().map(|d| d.code).collect());
            }
            Ok(DtcRead::NoErrors) => answered = true,
            Ok(other) => {
                debug!(
                    module = %module.id,
                    mask = mask.mask,
                    result = ?other,
                    "Double-check UDS read unusable"
                );
            }
            Err(e) => {
                debug!(module = %module.id, error = %e, "Double-check UDS read failed");
                break;
            }
        }
    }
    answered.then(HashSet::new)
}

/// Split `first_pass` by a second read; a failed read confirms everything
fn settle(
    elm: &ElmAdapter,
    module: &EcuModule,
    first_pass: Vec<ParsedDtc>,
    second_pass: Option<HashSet<DtcCode>>,
    result: &mut VerificationResult,
) {
    match second_pass {
        Some(second_pass) => {
            let (confirmed, discarded): (Vec<_>, Vec<_>) = first_pass
                .into_iter()
                .partition(|d| second_pass.contains(&d.code));
            for dtc in &discarded {
                elm.trace(&format!(
                    "{}: {} not reproduced, discarded",
                    module.short_name, dtc.code
                ));
            }
            result.confirmed.extend(confirmed);
            result.discarded.extend(discarded);
        }
        None => {
            elm.trace(&format!(
                "{}: double-check read failed, keeping {} code(s)",
                module.short_name,
                first_pass.len()
            ));
            result.confirmed.extend(first_pass);
        }
    }
}

/// Confirm `findings` against a second read of each reporting module
///
/// Codes without a module are confirmed as they are. Within a module,
/// Mode 03 codes come before UDS codes in the result.
pub async fn double_check(
    elm: &ElmAdapter,
    config: &ScanConfig,
    findings: &[ParsedDtc],
) -> VerificationResult {
    let (unattributed, groups) = group_by_module(findings);
    let mut result = VerificationResult {
        confirmed: unattributed,
        discarded: Vec::new(),
    };

    for (module, first_pass) in groups {
        elm.select_module(&module, config.config_timeout()).await;
        let (uds, obd): (Vec<_>, Vec<_>) = first_pass
            .into_iter()
            .partition(|d| d.source == DtcSource::Uds);

        if !obd.is_empty() {
            let second_pass = reread_mode03(elm, config, &module).await;
            settle(elm, &module, obd, second_pass, &mut result);
        }
        if !uds.is_empty() {
            let second_pass = reread_uds(elm, config, &module).await;
            settle(elm, &module, uds, second_pass, &mut result);
        }
    }

    info!(
        confirmed = result.confirmed.len(),
        discarded = result.discarded.len(),
        "Double-check complete"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use elmdiag_core::EcuCategory;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const ECM: EcuModule =
        EcuModule::new("engine", "Engine", "ECM", EcuCategory::Powertrain, 0x7E0, 0x7E8);

    fn dtc(code: &str, module: Option<&EcuModule>) -> ParsedDtc {
        let dtc = ParsedDtc::new(DtcCode::parse(code).unwrap(), &code[1..], DtcSource::Obd);
        match module {
            Some(m) => dtc.with_module(m),
            None => dtc,
        }
    }

    fn uds_dtc(code: &str) -> ParsedDtc {
        ParsedDtc::new(DtcCode::parse(code).unwrap(), &code[1..], DtcSource::Uds)
            .with_status(0x08)
            .with_module(&ECM)
    }

    #[tokio::test]
    async fn test_unattributed_findings_are_confirmed_without_query() {
        let mock = Arc::new(MockTransport::new());
        let elm = ElmAdapter::new(mock.clone());

        let result = double_check(&elm, &ScanConfig::default(), &[dtc("P0300", None)]).await;

        assert_eq!(result.confirmed.len(), 1);
        assert!(result.discarded.is_empty());
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_no_data_fails_open() {
        let mock = Arc::new(MockTransport::new());
        let elm = ElmAdapter::new(mock.clone());

        let findings = [dtc("P0300", Some(&ECM)), dtc("P0171", Some(&ECM))];
        let result = double_check(&elm, &ScanConfig::default(), &findings).await;

        assert_eq!(result.confirmed, findings.to_vec());
        assert!(result.discarded.is_empty());
    }

    #[tokio::test]
    async fn test_partial_reproduction() {
        let mock = Arc::new(MockTransport::new());
        mock.with_mode03(ECM.tx_header, &[DtcCode::parse("P0171").unwrap()]);
        let elm = ElmAdapter::new(mock.clone());

        let findings = [dtc("P0300", Some(&ECM)), dtc("P0171", Some(&ECM))];
        let result = double_check(&elm, &ScanConfig::default(), &findings).await;

        assert_eq!(result.confirmed, vec![findings[1].clone()]);
        assert_eq!(result.discarded, vec![findings[0].clone()]);
        assert_eq!(mock.count_sent(Some(ECM.tx_header), "03"), 1);
    }

    #[tokio::test]
    async fn test_uds_codes_are_rechecked_with_status_masks() {
        let mock = Arc::new(MockTransport::new());
        mock.on_module(ECM.tx_header, "190208", "59 02 FF")
            .on_module(ECM.tx_header, "190204", "59 02 FF 01 71 00 04");
        let elm = ElmAdapter::new(mock.clone());

        let findings = [uds_dtc("P0171"), uds_dtc("P0420")];
        let result = double_check(&elm, &ScanConfig::default(), &findings).await;

        assert_eq!(result.confirmed, vec![findings[0].clone()]);
        assert_eq!(result.discarded, vec![findings[1].clone()]);
        assert_eq!(mock.count_sent(Some(ECM.tx_header), "03"), 0);
        assert_eq!(mock.count_sent(Some(ECM.tx_header), "3E00"), 1);
        assert_eq!(mock.count_sent(Some(ECM.tx_header), "190209"), 0);
    }

    #[tokio::test]
    async fn test_uds_reread_without_answer_keeps_codes() {
        let mock = Arc::new(MockTransport::new());
        let elm = ElmAdapter::new(mock.clone());

        let findings = [uds_dtc("P0420")];
        let result = double_check(&elm, &ScanConfig::default(), &findings).await;

        assert_eq!(result.confirmed, findings.to_vec());
        assert!(result.discarded.is_empty());
        // Every configured mask was tried
        assert_eq!(mock.count_sent(Some(ECM.tx_header), "1902FF"), 1);
    }

    #[tokio::test]
    async fn test_each_source_checked_by_its_own_read() {
        let mock = Arc::new(MockTransport::new());
        mock.with_mode03(ECM.tx_header, &[DtcCode::parse("P0300").unwrap()])
            .on_module(ECM.tx_header, "190208", "59 02 FF 04 20 00 08");
        let elm = ElmAdapter::new(mock.clone());

        // P0420 came from UDS only; Mode 03 not listing it must not discard it
        let findings = [dtc("P0300", Some(&ECM)), uds_dtc("P0420")];
        let result = double_check(&elm, &ScanConfig::default(), &findings).await;

        assert_eq!(result.confirmed, findings.to_vec());
        assert!(result.discarded.is_empty());
        assert_eq!(mock.count_sent(Some(ECM.tx_header), "03"), 1);
        assert_eq!(mock.count_sent(Some(ECM.tx_header), "190208"), 1);
    }
}
