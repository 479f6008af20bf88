//! Decode command - turn raw adapter text into trouble codes

use anyhow::Result;
use elmdiag_engine::codec::{decode_mode03, decode_uds_dtcs, DtcRead};

use crate::output::{DtcRow, OutputContext};

/// Decode a Mode 03 or UDS 0x59 0x02 response given on the command line
pub fn decode(input: &[String], ctx: &OutputContext) -> Result<()> {
    let text = input.join(" ");
    let read = match decode_mode03(&text) {
        DtcRead::Unusable => decode_uds_dtcs(&text),
        read => read,
    };

    match read {
        DtcRead::Codes(codes) => {
            let rows: Vec<DtcRow> = codes.iter().map(DtcRow::from).collect();
            ctx.print(&rows);
            Ok(())
        }
        DtcRead::NoErrors => {
            ctx.info("Valid response, no codes stored");
            Ok(())
        }
        DtcRead::NoData => {
            ctx.info("Adapter reported no data");
            Ok(())
        }
        DtcRead::Negative(negative) => anyhow::bail!("ECU {}", negative),
        DtcRead::Unusable => anyhow::bail!("Not a Mode 03 or UDS 0x19 response: {}", text),
    }
}
