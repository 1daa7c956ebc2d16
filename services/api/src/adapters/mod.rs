pub mod db;
pub mod files;
pub mod gateway;
pub mod mailer;

pub use db::DbAdapter;
pub use files::MediaCertificateStore;
pub use gateway::ProntuGatewayAdapter;
pub use mailer::{HttpMailerAdapter, LogNotifier};
