//! Provider integrations for the encore flow engine.
//!
//! This crate provides HTTP implementations of the engine's side-effect
//! traits:
//!
//! - **Email**: [`HttpEmailSender`], a Postmark-style transactional email API
//! - **Mailchimp**: [`MailchimpAudienceSync`], list membership through the
//!   Mailchimp Marketing API

pub mod email;
pub mod error;
pub mod mailchimp;

pub use email::{EmailConfig, HttpEmailSender};
pub use error::ClientError;
pub use mailchimp::{MailchimpAudienceSync, MailchimpConfig};
