//! Batched profile lookup.

use std::collections::{BTreeSet, HashMap};

use crate::error::AppError;
use crate::models::{ProfileSummary, Session};
use crate::services::data_source::DataSource;

/// Resolved profiles keyed by user id.
pub type ProfileMap = HashMap<String, ProfileSummary>;

/// Resolves user identifiers to display fragments in one round trip.
pub struct ProfileResolver<'a> {
    source: &'a dyn DataSource,
}

impl<'a> ProfileResolver<'a> {
    pub fn new(source: &'a dyn DataSource) -> Self {
        Self { source }
    }

    /// Resolve the distinct, non-empty ids among `ids`.
    ///
    /// Issues no remote call when nothing is left after filtering, otherwise
    /// exactly one. Ids without a profile are absent from the map. A failed
    /// lookup is returned as is.
    pub async fn resolve<I, S>(&self, session: &Session, ids: I) -> Result<ProfileMap, AppError>
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        let unique = distinct_ids(ids);
        if unique.is_empty() {
            return Ok(ProfileMap::new());
        }

        log::debug!("[profiles] Resolving {} user ids", unique.len());
        let profiles = self.source.fetch_profiles(session, &unique).await?;

        // Keep the map to what was asked for, whatever the backend sent back.
        let wanted: BTreeSet<&str> = unique.iter().map(String::as_str).collect();
        Ok(profiles
            .into_iter()
            .filter(|p| wanted.contains(p.user_id.as_str()))
            .map(|p| (p.user_id.clone(), ProfileSummary::from(p)))
            .collect())
    }
}

/// Drop missing and empty ids and deduplicate, in a stable order.
fn distinct_ids<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    ids.into_iter()
        .flatten()
        .map(|id| id.as_ref().to_string())
        .filter(|id| !id.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_ids_filters_and_dedupes() {
        let ids = vec![
            Some("u2"),
            Some(""),
            None,
            Some("u1"),
            Some("u2"),
            Some("u1"),
        ];
        assert_eq!(distinct_ids(ids), vec!["u1".to_string(), "u2".to_string()]);
    }

    #[test]
    fn test_distinct_ids_empty() {
        let ids: Vec<Option<&str>> = vec![None, Some("")];
        assert!(distinct_ids(ids).is_empty());
    }
}
