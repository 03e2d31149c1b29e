//! Cobranza - Subscription Billing & Payment Reconciliation Service
//!
//! This crate reconciles asynchronous, duplicate-prone signals from the
//! payment provider (redirect callbacks and webhooks) into a consistent
//! ledger of subscriptions, payments, and invoices.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
