use std::convert::Infallible;

use clap::Args;

use crate::cli::op::{Op, OpContext};
use crate::state::APP_NAME;

/// Print the b2up version
#[derive(Args, Debug, Clone)]
pub struct Version;

#[async_trait::async_trait]
impl Op for Version {
    type Error = Infallible;
    type Output = String;

    async fn execute(&self, _ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        Ok(format!("{} {}", APP_NAME, env!("CARGO_PKG_VERSION")))
    }
}
