use crate::error::{AppError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum Op {
    AddCustomer,
    AddLead,
    ConvertLead,
    Archive,
    Reactivate,
    RemoveCustomer,
    AddStop,
    RemoveStop,
    ClearRoute,
    CompleteStop,
    UncompleteStop,
    OptimizeRoute,
    RecordPayment,
    DeletePayment,
}

/// One row of the operations file. Apart from `op`, every column is
/// optional; which ones an operation needs is checked when it is applied.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Command {
    pub op: Op,
    pub customer: Option<u32>,
    pub stop: Option<u32>,
    pub payment: Option<u32>,
    pub date: Option<String>,
    pub amount: Option<Decimal>,
    pub name: Option<String>,
    pub city: Option<String>,
    pub notes: Option<String>,
}

/// Reads operations from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// and yields commands lazily so large files stream.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(AppError::from))
    }
}

pub const HEADER: &str = "op,customer,stop,payment,date,amount,name,city,notes";

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_valid_stream() {
        let data = format!(
            "{HEADER}\n\
             add-customer, , , , , 100.00, Ned, Springfield,\n\
             record-payment, 1, , , 2024-06-01, 30.00, , , june dues\n"
        );
        let reader = CommandReader::new(data.as_bytes());
        let commands: Vec<Result<Command>> = reader.commands().collect();
        assert_eq!(commands.len(), 2);

        let add = commands[0].as_ref().unwrap();
        assert_eq!(add.op, Op::AddCustomer);
        assert_eq!(add.name.as_deref(), Some("Ned"));
        assert_eq!(add.amount, Some(dec!(100.00)));
        assert_eq!(add.customer, None);

        let pay = commands[1].as_ref().unwrap();
        assert_eq!(pay.op, Op::RecordPayment);
        assert_eq!(pay.customer, Some(1));
        assert_eq!(pay.date.as_deref(), Some("2024-06-01"));
        assert_eq!(pay.notes.as_deref(), Some("june dues"));
    }

    #[test]
    fn test_reader_unknown_op() {
        let data = format!("{HEADER}\nteleport, 1, , , , , , ,\n");
        let reader = CommandReader::new(data.as_bytes());
        let commands: Vec<Result<Command>> = reader.commands().collect();
        assert!(commands[0].is_err());
    }
}
