//! Estimated billing charges from CloudWatch

use crate::config::load_sdk_config;
use crate::error::remote_error;
use aws_sdk_cloudwatch::{
    operation::get_metric_statistics::GetMetricStatisticsOutput,
    primitives::DateTime as AwsDateTime,
    types::{Dimension, Statistic},
    Client,
};
use chrono::{Duration, Utc};
use ec2kit_core::{Ec2KitError, Result};
use tracing::debug;

/// Billing metrics only exist in this region
pub const BILLING_REGION: &str = "us-east-1";

/// Latest estimated charges
#[derive(Debug, Clone, PartialEq)]
pub struct Billing {
    pub label: String,
    pub price: f64,
}

impl std::fmt::Display for Billing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:.2} USD", self.label, self.price)
    }
}

/// Query the maximum `EstimatedCharges` of the last 8 hours
///
/// Charges are published every few hours, so one 24 hour period over the
/// last 8 hours yields a single datapoint.
pub async fn estimated_charges(profile: Option<&str>) -> Result<Billing> {
    let config = load_sdk_config(BILLING_REGION, profile).await;
    let client = Client::new(&config);

    let end_time = Utc::now();
    let start_time = end_time - Duration::hours(8);
    debug!(%start_time, %end_time, "Querying estimated charges");

    let output = client
        .get_metric_statistics()
        .namespace("AWS/Billing")
        .metric_name("EstimatedCharges")
        .dimensions(Dimension::builder().name("Currency").value("USD").build())
        .statistics(Statistic::Maximum)
        .period(86400)
        .start_time(AwsDateTime::from_secs(start_time.timestamp()))
        .end_time(AwsDateTime::from_secs(end_time.timestamp()))
        .send()
        .await
        .map_err(remote_error("GetMetricStatistics", "AWS/Billing EstimatedCharges"))?;

    billing_from(&output)
}

fn billing_from(output: &GetMetricStatisticsOutput) -> Result<Billing> {
    let label = output
        .label()
        .ok_or_else(|| Ec2KitError::invariant("billing metric has no label"))?;
    let datapoint = output
        .datapoints()
        .first()
        .ok_or_else(|| Ec2KitError::invariant("billing metric has no datapoints"))?;
    let price = datapoint
        .maximum()
        .ok_or_else(|| Ec2KitError::invariant("billing datapoint has no maximum"))?;

    Ok(Billing {
        label: label.to_string(),
        price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_cloudwatch::types::Datapoint;

    #[test]
    fn test_billing_from_first_datapoint() {
        let output = GetMetricStatisticsOutput::builder()
            .label("EstimatedCharges")
            .datapoints(Datapoint::builder().maximum(12.5).build())
            .build();

        let billing = billing_from(&output).unwrap();
        assert_eq!(billing.price, 12.5);
        assert_eq!(billing.to_string(), "EstimatedCharges 12.50 USD");
    }

    #[test]
    fn test_missing_parts_are_errors() {
        let no_label = GetMetricStatisticsOutput::builder()
            .datapoints(Datapoint::builder().maximum(1.0).build())
            .build();
        let no_points = GetMetricStatisticsOutput::builder().label("x").build();
        let no_maximum = GetMetricStatisticsOutput::builder()
            .label("x")
            .datapoints(Datapoint::builder().average(1.0).build())
            .build();

        for output in [no_label, no_points, no_maximum] {
            assert!(matches!(billing_from(&output), Err(Ec2KitError::Invariant(_))));
        }
    }
}
