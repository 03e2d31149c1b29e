//! MercadoPago payment provider adapter.
//!
//! - `adapter` - reqwest-based `PaymentProvider` implementation
//! - `api_types` - wire types for the provider's REST API
//! - `mock_provider` - in-process mock for tests and development

mod adapter;
mod api_types;
mod mock_provider;

pub use adapter::{MercadoPagoAdapter, MercadoPagoConfig};
pub use mock_provider::MockPaymentProvider;
