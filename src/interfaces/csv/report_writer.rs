use crate::domain::customer::Customer;
use crate::domain::payment::Payment;
use crate::domain::stop::RouteStop;
use crate::error::Result;
use std::io::Write;

/// Writes CSV reports to any `Write` sink. Monetary values are formatted
/// with two decimals here, at the presentation edge; the domain keeps exact
/// decimals throughout.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_customers(&mut self, customers: &[Customer]) -> Result<()> {
        self.writer
            .write_record(["id", "name", "city", "balance", "last_visit", "status"])?;
        for c in customers {
            self.writer.write_record([
                c.id.to_string(),
                c.name.clone(),
                c.city.clone().unwrap_or_default(),
                format!("{:.2}", c.balance.value()),
                c.last_visit.map(|d| d.to_string()).unwrap_or_default(),
                c.status.as_str().to_string(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_route(&mut self, route: &[(RouteStop, Customer)]) -> Result<()> {
        self.writer
            .write_record(["sequence", "stop", "customer", "city", "completed"])?;
        for (stop, customer) in route {
            self.writer.write_record([
                stop.sequence.to_string(),
                stop.id.to_string(),
                customer.name.clone(),
                customer.city.clone().unwrap_or_default(),
                stop.completed.to_string(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_payments(&mut self, payments: &[Payment]) -> Result<()> {
        self.writer.write_record([
            "id",
            "receipt",
            "amount",
            "date",
            "previous_balance",
            "notes",
        ])?;
        for p in payments {
            self.writer.write_record([
                p.id.to_string(),
                p.receipt_number.clone().unwrap_or_default(),
                format!("{:.2}", p.amount.value()),
                p.payment_date.to_string(),
                format!("{:.2}", p.previous_balance.value()),
                p.notes.clone().unwrap_or_default(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
