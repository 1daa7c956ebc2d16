pub mod domain;
pub mod intake;
pub mod ports;
pub mod reconciliation;

pub use domain::{
    Applicant, ApplicationState, Charge, ChargeRequest, ConfirmedApplication, Course,
    Fee, FeeScope, Institution, PaymentStatus, PendingApplication,
};
pub use intake::{IntakeError, IntakeService, IntakeSettings, NewApplication, SubmissionReceipt};
pub use ports::{
    ApplicationStore, CatalogStore, CertificateStore, Notifier, PaymentGateway, PendingStore,
    PortError, PortResult,
};
pub use reconciliation::{Outcome, ReconcileError, ReconciliationService};
