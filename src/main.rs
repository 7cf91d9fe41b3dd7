use candyroute::application::directory::CustomerDirectory;
use candyroute::application::ledger::BalanceLedger;
use candyroute::application::sequencer::RouteSequencer;
use candyroute::domain::customer::CustomerId;
use candyroute::domain::ports::{CustomerStoreRef, PaymentStoreRef, StopStoreRef};
use candyroute::error::AppError;
use candyroute::infrastructure::in_memory::InMemoryStore;
use candyroute::interfaces::csv::command_reader::{Command, CommandReader, Op};
use candyroute::interfaces::csv::report_writer::ReportWriter;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input operations CSV file
    input: PathBuf,

    /// Print the route for this date (YYYY-MM-DD) instead of the customer
    /// report
    #[arg(long)]
    route: Option<String>,

    /// Print the payment history for this customer instead of the customer
    /// report
    #[arg(long)]
    payments: Option<CustomerId>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn open_stores(cli: &Cli) -> Result<(CustomerStoreRef, StopStoreRef, PaymentStoreRef)> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = &cli.db_path {
        let store =
            candyroute::infrastructure::rocksdb::RocksDbStore::open(db_path).into_diagnostic()?;
        return Ok((
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store),
        ));
    }
    let _ = cli;
    let store = InMemoryStore::new();
    Ok((
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let (customers, stops, payments) = open_stores(&cli)?;
    let directory = CustomerDirectory::new(customers.clone(), stops.clone(), payments.clone());
    let sequencer = RouteSequencer::new(customers.clone(), stops.clone());
    let ledger = BalanceLedger::new(customers.clone(), payments.clone());

    let file = File::open(&cli.input).into_diagnostic()?;
    for command in CommandReader::new(file).commands() {
        match command {
            Ok(command) => {
                if let Err(e) = apply(&command, &directory, &sequencer, &ledger).await {
                    eprintln!("Error applying operation: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading operation: {}", e);
            }
        }
    }

    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    if let Some(date) = &cli.route {
        let route = sequencer.route_for(date).await.into_diagnostic()?;
        let mut rows = Vec::with_capacity(route.len());
        for stop in route {
            let customer = customers
                .get(stop.customer_id)
                .await
                .into_diagnostic()?
                .ok_or_else(|| AppError::NotFound(format!("customer {}", stop.customer_id)))
                .into_diagnostic()?;
            rows.push((stop, customer));
        }
        writer.write_route(&rows).into_diagnostic()?;
    } else if let Some(customer_id) = cli.payments {
        let history = ledger.payments_for(customer_id).await.into_diagnostic()?;
        writer.write_payments(&history).into_diagnostic()?;
    } else {
        let all = directory.all_customers().await.into_diagnostic()?;
        writer.write_customers(&all).into_diagnostic()?;
    }

    Ok(())
}

async fn apply(
    command: &Command,
    directory: &CustomerDirectory,
    sequencer: &RouteSequencer,
    ledger: &BalanceLedger,
) -> candyroute::error::Result<()> {
    match command.op {
        Op::AddCustomer => {
            directory
                .add_customer(
                    command.name.as_deref().unwrap_or(""),
                    command.city.clone(),
                    command.amount,
                )
                .await?;
        }
        Op::AddLead => {
            directory
                .add_lead(command.name.as_deref().unwrap_or(""), command.city.clone())
                .await?;
        }
        Op::ConvertLead => {
            directory
                .convert_lead(require(command.customer, "customer")?)
                .await?;
        }
        Op::Archive => {
            directory
                .archive(require(command.customer, "customer")?)
                .await?;
        }
        Op::Reactivate => {
            directory
                .reactivate(require(command.customer, "customer")?)
                .await?;
        }
        Op::RemoveCustomer => {
            directory
                .remove_customer(require(command.customer, "customer")?)
                .await?;
        }
        Op::AddStop => {
            sequencer
                .append_stop(
                    require(command.customer, "customer")?,
                    require_str(&command.date, "date")?,
                )
                .await?;
        }
        Op::RemoveStop => {
            sequencer.remove_stop(require(command.stop, "stop")?).await?;
        }
        Op::ClearRoute => {
            sequencer
                .clear_route(require_str(&command.date, "date")?)
                .await?;
        }
        Op::CompleteStop => {
            sequencer
                .complete_stop(require(command.stop, "stop")?)
                .await?;
        }
        Op::UncompleteStop => {
            sequencer
                .uncomplete_stop(require(command.stop, "stop")?)
                .await?;
        }
        Op::OptimizeRoute => {
            sequencer
                .optimize_route(require_str(&command.date, "date")?)
                .await?;
        }
        Op::RecordPayment => {
            ledger
                .record_payment(
                    require(command.customer, "customer")?,
                    require(command.amount, "amount")?,
                    command.date.as_deref(),
                    command.notes.clone(),
                )
                .await?;
        }
        Op::DeletePayment => {
            ledger
                .delete_payment(
                    require(command.customer, "customer")?,
                    require(command.payment, "payment")?,
                )
                .await?;
        }
    }
    Ok(())
}

fn require<T: Copy>(field: Option<T>, column: &str) -> candyroute::error::Result<T> {
    field.ok_or_else(|| AppError::InvalidInput(format!("missing {column} column")))
}

fn require_str<'a>(field: &'a Option<String>, column: &str) -> candyroute::error::Result<&'a str> {
    field
        .as_deref()
        .ok_or_else(|| AppError::InvalidInput(format!("missing {column} column")))
}
