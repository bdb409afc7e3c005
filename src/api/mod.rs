mod client;

pub use client::{ApiCaseRow, CasesApiClient};
