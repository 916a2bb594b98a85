pub mod cert;
pub mod config;
pub mod error;
pub mod executor;
pub mod firewall;
pub mod input;
pub mod logger;
pub mod plan;
pub mod render;
pub mod runner;
pub mod status;

// 公共导出
pub use cert::{CertificateMaterial, CertificateResolver};
pub use config::{CertificateSource, CertificateStrategy, HostLayout, ProvisioningRequest, Settings};
pub use error::{CertError, FirewallError, ProvisionError, StepError, ValidationError};
pub use executor::{ProvisioningStep, StepExecutor};
pub use firewall::{Firewall, FirewallProfile};
pub use input::{collect, Prompter, RequestDraft};
pub use logger::RunJournal;
pub use render::{render, RenderedConfig};
pub use runner::{CommandRunner, CommandSpec, RecordingRunner, SystemRunner};
pub use status::StatusReport;
