use crate::domain::commission::CommissionBreakdown;
use crate::domain::payment_account::PaymentAccount;
use crate::interfaces::csv::quote_reader::QuoteRequest;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct QuoteRow {
    type_id: Uuid,
    amount: Decimal,
    fixed: Decimal,
    percentage: Decimal,
    commission: Decimal,
    total_charged: Decimal,
}

#[derive(Debug, Serialize)]
struct AccountRow<'a> {
    account_id: Uuid,
    holder_name: &'a str,
    bank_name: &'a str,
    priority: i32,
    daily_remaining: Decimal,
    monthly_remaining: Decimal,
}

/// Writes CLI results as CSV with a header row.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_quote(&mut self, request: &QuoteRequest, breakdown: &CommissionBreakdown) -> csv::Result<()> {
        self.writer.serialize(QuoteRow {
            type_id: request.type_id,
            amount: request.amount.normalize(),
            fixed: breakdown.fixed.normalize(),
            percentage: breakdown.percentage.normalize(),
            commission: breakdown.total.normalize(),
            total_charged: breakdown.total_charged.normalize(),
        })
    }

    /// Remaining headroom is computed from the counters as given; apply any
    /// due reset before calling.
    pub fn write_account(&mut self, account: &PaymentAccount) -> csv::Result<()> {
        self.writer.serialize(AccountRow {
            account_id: account.id,
            holder_name: &account.holder_name,
            bank_name: &account.bank_name,
            priority: account.priority,
            daily_remaining: (account.daily_limit - account.current_daily_total).normalize(),
            monthly_remaining: (account.monthly_limit - account.current_monthly_total).normalize(),
        })
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}
