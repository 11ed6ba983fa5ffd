//! The six logical tables synced per account
//!
//! Structural tables (campaigns, adsets, ads) are current-state snapshots and
//! are overwritten on every load. Metric tables (the three insight levels) are
//! dated and append-only, partitioned by the run timestamp.

use serde::{Deserialize, Serialize};

/// Audit table name used when the fetch phase fails for an account
pub const FETCH_ALL: &str = "FETCH_ALL";

/// Column added to every loaded row; also the metric partition key
pub const RUN_TIMESTAMP_COLUMN: &str = "last_run_timestamp";

/// Column added to every loaded row
pub const ACCOUNT_COLUMN: &str = "ad_account_id";

/// Breakdown dimensions requested for every insight level
pub const DEFAULT_BREAKDOWNS: &[&str] = &["publisher_platform", "platform_position"];

const INSIGHT_FIELDS: &[&str] = &[
    "date_start",
    "date_stop",
    "impressions",
    "clicks",
    "spend",
    "cpm",
    "cpc",
    "reach",
];

/// Write behaviour class of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityClass {
    Structural,
    Metric,
}

/// Logical table synced for each account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Campaigns,
    AdSets,
    Ads,
    AdInsights,
    AdSetInsights,
    CampaignInsights,
}

impl TableKind {
    /// Load order: structure first, then metrics
    pub const ALL: [TableKind; 6] = [
        TableKind::Campaigns,
        TableKind::AdSets,
        TableKind::Ads,
        TableKind::AdInsights,
        TableKind::AdSetInsights,
        TableKind::CampaignInsights,
    ];

    pub const STRUCTURAL: [TableKind; 3] = [TableKind::Campaigns, TableKind::AdSets, TableKind::Ads];

    pub const METRIC: [TableKind; 3] = [
        TableKind::AdInsights,
        TableKind::AdSetInsights,
        TableKind::CampaignInsights,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            TableKind::Campaigns => "campaigns",
            TableKind::AdSets => "adsets",
            TableKind::Ads => "ads",
            TableKind::AdInsights => "ad_insights",
            TableKind::AdSetInsights => "adset_insights",
            TableKind::CampaignInsights => "campaign_insights",
        }
    }

    pub fn class(&self) -> EntityClass {
        match self {
            TableKind::Campaigns | TableKind::AdSets | TableKind::Ads => EntityClass::Structural,
            _ => EntityClass::Metric,
        }
    }

    pub fn is_metric(&self) -> bool {
        self.class() == EntityClass::Metric
    }

    /// Edge name of the structural resource under an account (`act_X/campaigns`)
    pub fn resource(&self) -> Option<&'static str> {
        match self {
            TableKind::Campaigns => Some("campaigns"),
            TableKind::AdSets => Some("adsets"),
            TableKind::Ads => Some("ads"),
            _ => None,
        }
    }

    /// Insight aggregation level for metric tables
    pub fn level(&self) -> Option<&'static str> {
        match self {
            TableKind::AdInsights => Some("ad"),
            TableKind::AdSetInsights => Some("adset"),
            TableKind::CampaignInsights => Some("campaign"),
            _ => None,
        }
    }

    /// Fields requested from the API
    pub fn fields(&self) -> Vec<&'static str> {
        match self {
            TableKind::Campaigns => {
                vec!["id", "name", "objective", "status", "start_time", "stop_time"]
            },
            TableKind::AdSets => vec!["id", "name", "campaign_id", "status", "targeting"],
            TableKind::Ads => vec!["id", "name", "adset_id", "campaign_id", "status", "creative"],
            TableKind::AdInsights => insight_fields(&["campaign_id", "adset_id", "ad_id"]),
            TableKind::AdSetInsights => insight_fields(&["campaign_id", "adset_id"]),
            TableKind::CampaignInsights => insight_fields(&["campaign_id"]),
        }
    }

    pub fn from_table_name(name: &str) -> Option<TableKind> {
        TableKind::ALL.into_iter().find(|t| t.table_name() == name)
    }
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}

fn insight_fields(ids: &[&'static str]) -> Vec<&'static str> {
    INSIGHT_FIELDS.iter().chain(ids.iter()).copied().collect()
}

/// Names of the metric tables, as stored in the audit ledger
pub fn metric_table_names() -> Vec<&'static str> {
    TableKind::METRIC.iter().map(|t| t.table_name()).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_classes_partition_the_catalog() {
        let structural: Vec<_> = TableKind::ALL.iter().filter(|t| !t.is_metric()).collect();
        let metric: Vec<_> = TableKind::ALL.iter().filter(|t| t.is_metric()).collect();
        assert_eq!(structural.len(), 3);
        assert_eq!(metric.len(), 3);
        for t in TableKind::STRUCTURAL {
            assert!(t.resource().is_some() && t.level().is_none());
        }
        for t in TableKind::METRIC {
            assert!(t.level().is_some() && t.resource().is_none());
        }
    }

    #[test]
    fn test_insight_fields_include_entity_keys() {
        let fields = TableKind::AdInsights.fields();
        assert!(fields.contains(&"date_start"));
        assert!(fields.contains(&"ad_id"));
        assert!(!TableKind::CampaignInsights.fields().contains(&"adset_id"));
    }

    #[test]
    fn test_table_name_lookup() {
        assert_eq!(TableKind::from_table_name("adset_insights"), Some(TableKind::AdSetInsights));
        assert_eq!(TableKind::from_table_name(FETCH_ALL), None);
        assert_eq!(metric_table_names(), vec!["ad_insights", "adset_insights", "campaign_insights"]);
    }
}
