//! Per-module probes
//!
//! A full probe reads Mode 03 and then walks the UDS status masks; a light
//! probe (manufacturer addresses) sends a single UDS query. Nothing here
//! fails: every problem ends the probe early and is logged.

use elmdiag_core::{EcuModule, ParsedDtc};

use crate::codec::{decode_mode03, service_id, DtcRead, NrcAction};
use crate::config::{ScanConfig, StatusMaskConfig};
use crate::elm::ElmAdapter;
use crate::uds::{request, UdsClient};

/// What one module returned
#[derive(Debug, Default)]
pub struct ProbeReport {
    /// Codes tagged with the probed module, unique by code
    pub findings: Vec<ParsedDtc>,
    /// The module gave at least one readable answer
    pub responded: bool,
}

impl ProbeReport {
    fn add(&mut self, module: &EcuModule, codes: Vec<ParsedDtc>) {
        for dtc in codes {
            if !self.findings.iter().any(|d| d.code == dtc.code) {
                self.findings.push(dtc.with_module(module));
            }
        }
    }
}

pub struct ModuleProbe<'a> {
    elm: &'a ElmAdapter,
    config: &'a ScanConfig,
}

impl<'a> ModuleProbe<'a> {
    pub fn new(elm: &'a ElmAdapter, config: &'a ScanConfig) -> Self {
        Self { elm, config }
    }

    /// Mode 03, diagnostic session, then the status-mask list
    pub async fn full(&self, module: &EcuModule) -> ProbeReport {
        let mut report = ProbeReport::default();
        self.elm
            .select_module(module, self.config.config_timeout())
            .await;

        let mode03 = request(&[service_id::OBD_STORED_DTCS]);
        match self.elm.send(&mode03, self.config.mode03_timeout()).await {
            Ok(text) => {
                let read = decode_mode03(&text);
                report.responded |= read.is_answer() || matches!(read, DtcRead::Negative(_));
                match read {
                    DtcRead::Codes(codes) => {
                        self.elm.trace(&format!(
                            "{}: {} code(s) via Mode 03",
                            module.short_name,
                            codes.len()
                        ));
                        report.add(module, codes);
                    }
                    DtcRead::Negative(negative) => {
                        tracing::debug!(module = %module.id, %negative, "Mode 03 rejected");
                    }
                    _ => {}
                }
            }
            Err(e) => self
                .elm
                .trace(&format!("{}: Mode 03 failed: {}", module.short_name, e)),
        }

        if !self.config.uds_enabled {
            return report;
        }

        let uds = UdsClient::new(self.elm, self.config);
        match uds.open_session().await {
            Some(session) => {
                report.responded = true;
                tracing::debug!(module = %module.id, ?session, "UDS session open");
            }
            None => tracing::debug!(module = %module.id, "No UDS session acknowledged"),
        }

        let codes = self
            .read_masks(
                &uds,
                module,
                &self.config.status_masks,
                self.config.uds_timeout(),
                &mut report,
            )
            .await;
        report.add(module, codes);
        report
    }

    /// One UDS query with the first status mask and the short timeout
    pub async fn light(&self, module: &EcuModule) -> ProbeReport {
        let mut report = ProbeReport::default();
        self.elm
            .select_module(module, self.config.config_timeout())
            .await;

        let uds = UdsClient::new(self.elm, self.config);
        let masks = &self.config.status_masks[..self.config.status_masks.len().min(1)];
        let codes = self
            .read_masks(&uds, module, masks, self.config.alternate_timeout(), &mut report)
            .await;
        report.add(module, codes);
        report
    }

    /// Walk `masks` until one yields codes
    ///
    /// "Response pending" repeats the same mask once after a short wait.
    /// "Not supported" style answers and transport errors end the walk.
    /// Any positive or negative reply marks the module as responding.
    async fn read_masks(
        &self,
        uds: &UdsClient<'_>,
        module: &EcuModule,
        masks: &[StatusMaskConfig],
        timeout: std::time::Duration,
        report: &mut ProbeReport,
    ) -> Vec<ParsedDtc> {
        for (index, mask) in masks.iter().enumerate() {
            if index > 0 {
                uds.tester_present().await;
            }

            let mut retried = false;
            let read = loop {
                match uds.read_dtcs(mask.mask, timeout).await {
                    Ok(DtcRead::Negative(negative))
                        if negative.action() == NrcAction::RetryOnce && !retried =>
                    {
                        retried = true;
                        tracing::debug!(
                            module = %module.id,
                            mask = %format!("0x{:02X}", mask.mask),
                            "Response pending, retrying once"
                        );
                        tokio::time::sleep(self.config.response_pending_wait()).await;
                    }
                    other => break other,
                }
            };

            if let Ok(answer) = &read {
                report.responded |=
                    answer.is_answer() || matches!(answer, DtcRead::Negative(_));
            }

            match read {
                Ok(DtcRead::Codes(codes)) => {
                    self.elm.trace(&format!(
                        "{}: {} code(s) via UDS mask 0x{:02X} ({})",
                        module.short_name,
                        codes.len(),
                        mask.mask,
                        mask.description
                    ));
                    return codes;
                }
                Ok(DtcRead::Negative(negative)) => match negative.action() {
                    NrcAction::AbandonModule => {
                        self.elm
                            .trace(&format!("{}: UDS {}", module.short_name, negative));
                        break;
                    }
                    NrcAction::RetryOnce | NrcAction::NextMask => {
                        tracing::debug!(module = %module.id, %negative, "Trying next mask");
                    }
                },
                Ok(_) => {}
                Err(e) => {
                    self.elm
                        .trace(&format!("{}: UDS query failed: {}", module.short_name, e));
                    break;
                }
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockReply, MockTransport};
    use crate::codec::encode_mode03_response;
    use elmdiag_core::{CanHeader, DtcCode, DtcSource, EcuCategory};
    use std::sync::Arc;

    const ECM: EcuModule =
        EcuModule::new("engine", "Engine Control Module", "ECM", EcuCategory::Powertrain, 0x7E0, 0x7E8);

    fn header() -> Option<CanHeader> {
        Some(ECM.tx_header)
    }

    fn fast_config() -> ScanConfig {
        ScanConfig {
            response_pending_wait_ms: 1,
            ..ScanConfig::default()
        }
    }

    #[tokio::test]
    async fn test_full_probe_merges_obd_and_uds() {
        let mock = Arc::new(MockTransport::new());
        mock.with_mode03(ECM.tx_header, &[DtcCode::parse("P0300").unwrap()])
            .on_module(ECM.tx_header, "1003", "50 03")
            .on_module(ECM.tx_header, "190208", "59 02 FF 03 00 00 08 04 20 00 08");
        let elm = ElmAdapter::new(mock.clone());
        let config = fast_config();

        let report = ModuleProbe::new(&elm, &config).full(&ECM).await;

        let codes: Vec<&str> = report.findings.iter().map(|d| d.code.as_str()).collect();
        assert_eq!(codes, vec!["P0300", "P0420"]);
        assert!(report.findings.iter().all(|d| d.module_id() == Some("engine")));
        assert_eq!(report.findings[0].source, DtcSource::Obd);
        assert_eq!(report.findings[1].source, DtcSource::Uds);
        assert!(report.responded);
        // First mask produced codes, no further masks
        assert_eq!(mock.count_sent(header(), "190204"), 0);
        assert_eq!(mock.count_sent(header(), "3E00"), 0);
    }

    #[tokio::test]
    async fn test_masks_walk_with_keepalive() {
        let mock = Arc::new(MockTransport::new());
        mock.on_module(ECM.tx_header, "190208", "59 02 FF")
            .on_module(ECM.tx_header, "190204", "59 02 FF 01 71 00 04");
        let elm = ElmAdapter::new(mock.clone());
        let config = fast_config();

        let report = ModuleProbe::new(&elm, &config).full(&ECM).await;

        assert_eq!(report.findings[0].code.as_str(), "P0171");
        assert_eq!(report.findings[0].status_byte, Some(0x04));
        assert_eq!(mock.count_sent(header(), "3E00"), 1);
        assert_eq!(mock.count_sent(header(), "1902FF"), 0);
    }

    #[tokio::test]
    async fn test_response_pending_retries_once() {
        let mock = Arc::new(MockTransport::new());
        mock.on_module(ECM.tx_header, "190208", "7F 19 78");
        let elm = ElmAdapter::new(mock.clone());
        let config = fast_config();

        ModuleProbe::new(&elm, &config).full(&ECM).await;

        assert_eq!(mock.count_sent(header(), "190208"), 2);
        // Still pending after the retry: move on to the next mask
        assert_eq!(mock.count_sent(header(), "190204"), 1);
    }

    #[tokio::test]
    async fn test_pending_then_answer() {
        let mock = Arc::new(MockTransport::new());
        mock.script(
            header(),
            "190208",
            vec![
                MockReply::text("7F 19 78"),
                MockReply::text("59 02 FF C1 00 00 09"),
            ],
        );
        let elm = ElmAdapter::new(mock.clone());
        let config = fast_config();

        let report = ModuleProbe::new(&elm, &config).full(&ECM).await;

        assert_eq!(report.findings[0].code.as_str(), "U0100");
        assert_eq!(mock.count_sent(header(), "190208"), 2);
    }

    #[tokio::test]
    async fn test_service_not_supported_abandons_module() {
        let mock = Arc::new(MockTransport::new());
        mock.on_module(ECM.tx_header, "190208", "7F 19 11");
        let elm = ElmAdapter::new(mock.clone());
        let config = fast_config();

        let report = ModuleProbe::new(&elm, &config).full(&ECM).await;

        assert!(report.findings.is_empty());
        // A rejection is still an answer
        assert!(report.responded);
        assert_eq!(mock.count_sent(header(), "190208"), 1);
        assert_eq!(mock.count_sent(header(), "190204"), 0);
        assert_eq!(mock.count_sent(header(), "3E00"), 0);
    }

    #[tokio::test]
    async fn test_mode03_timeout_does_not_stop_uds() {
        let mock = Arc::new(MockTransport::new());
        mock.timeout_on(ECM.tx_header, "03")
            .on_module(ECM.tx_header, "190208", "59 02 FF 01 01 00 08");
        let elm = ElmAdapter::new(mock.clone());
        let config = fast_config();

        let report = ModuleProbe::new(&elm, &config).full(&ECM).await;

        assert_eq!(report.findings[0].code.as_str(), "P0101");
        assert!(report.responded);
    }

    #[tokio::test]
    async fn test_silent_module_is_not_responding() {
        let mock = Arc::new(MockTransport::new());
        mock.timeout_on(ECM.tx_header, "03")
            .timeout_on(ECM.tx_header, "1003")
            .timeout_on(ECM.tx_header, "190208");
        let elm = ElmAdapter::new(mock.clone());
        let config = fast_config();

        let report = ModuleProbe::new(&elm, &config).full(&ECM).await;

        assert!(report.findings.is_empty());
        assert!(!report.responded);
    }

    #[tokio::test]
    async fn test_uds_disabled_reads_mode03_only() {
        let mock = Arc::new(MockTransport::new());
        mock.on_module(ECM.tx_header, "03", &encode_mode03_response(&[]));
        let elm = ElmAdapter::new(mock.clone());
        let config = ScanConfig {
            uds_enabled: false,
            ..fast_config()
        };

        let report = ModuleProbe::new(&elm, &config).full(&ECM).await;

        assert!(report.responded);
        assert!(report.findings.is_empty());
        assert_eq!(mock.sent_commands(), vec!["ATSH7E0", "ATCRA7E8", "03"]);
    }

    #[tokio::test]
    async fn test_light_probe_sends_single_mask() {
        let mock = Arc::new(MockTransport::new());
        let elm = ElmAdapter::new(mock.clone());
        let config = fast_config();

        let report = ModuleProbe::new(&elm, &config).light(&ECM).await;

        assert!(!report.responded);
        assert_eq!(mock.sent_commands(), vec!["ATSH7E0", "ATCRA7E8", "190208"]);
    }
}
