use crate::application::reconciliation::ReconciliationReport;
use crate::domain::payment::PaymentId;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct OutcomeRecord<'a> {
    payment_id: PaymentId,
    transaction_id: &'a str,
    outcome: &'static str,
}

/// Writes one `payment_id,transaction_id,outcome` row per reconciled payment.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_report(&mut self, report: &ReconciliationReport) -> Result<()> {
        for outcome in &report.outcomes {
            self.writer.serialize(OutcomeRecord {
                payment_id: outcome.payment_id,
                transaction_id: &outcome.transaction_id,
                outcome: match &outcome.result {
                    Ok(_) => "reversed",
                    Err(e) => e.kind().as_str(),
                },
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
