pub mod accounting;

pub use accounting::{AccountingLayer, InternalRedirect, RequestContext};
