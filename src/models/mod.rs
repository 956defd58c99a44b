mod id;
mod invoice;
mod property;
mod run;
mod statement;

pub use id::{IdError, InvoiceId, RunId, StatementId};
pub use invoice::{Invoice, InvoiceFinancials};
pub use property::Property;
pub use run::{LogLevel, RunCompletion, RunLogEntry, RunStatus, ScrapeRun};
pub use statement::StatementDetail;
