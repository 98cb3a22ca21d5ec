use crate::cache::ExpiringCache;
use crate::error::Result;
use crate::extract;
use crate::info::{build_info, MovieInfo};
use crate::provider::{MetadataProvider, RawRecord, REQUIRED_DETAIL_SETS};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

const SEARCH_TABLE: &str = "search_movie";
const INFO_TABLE: &str = "get_info";
/// Provider-specific identifier prefix, stripped to form the canonical id
const ID_PREFIX: &str = "tt";

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// End-to-end query orchestration: check cache, call the provider on a miss,
/// normalize, write back, return. Synchronous and blocking throughout; no
/// retry policy is applied here, provider and storage failures surface to
/// the caller as-is.
pub struct MetadataService<P: MetadataProvider> {
    provider: P,
    cache: ExpiringCache,
}

impl<P: MetadataProvider> MetadataService<P> {
    pub fn new(provider: P, cache: ExpiringCache) -> Self {
        Self { provider, cache }
    }

    /// Free-text movie search.
    ///
    /// Results are restricted to movie records whose title set contains an
    /// exact case-insensitive match of `text`, then ranked into four
    /// priority tiers: exact title match, upstream title contained in the
    /// query, query contained in the upstream title, and everything else.
    /// Each tier is sorted by (title, year) descending.
    pub fn search(&self, text: &str) -> Result<Vec<MovieInfo>> {
        let key = WHITESPACE_RE
            .replace_all(&text.to_lowercase(), "_")
            .into_owned();
        if let Some(cached) = self.cache.lookup(&[&key], SEARCH_TABLE)? {
            debug!(query = text, "search served from cache");
            return Ok(cached);
        }

        info!(query = text, "searching provider");
        let query = text.to_lowercase();
        let mut candidates = Vec::new();
        for record in self.provider.search_by_text(text)? {
            let is_movie = extract::kind(&record).is_some_and(|kind| kind.contains("movie"));
            if !is_movie {
                continue;
            }
            if extract::all_titles(&record)
                .iter()
                .any(|title| title.to_lowercase() == query)
            {
                candidates.push(record);
            }
        }

        let ranked = rank_matches(candidates, &query);
        let results: Vec<MovieInfo> = ranked.iter().map(build_info).collect();

        self.cache.store(&results, &[&key], SEARCH_TABLE, None)?;
        Ok(results)
    }

    /// Fetches one movie by identifier, accepting the provider-prefixed form
    /// ("tt0133093") or the bare canonical one. All required detail sets are
    /// loaded before normalization.
    pub fn fetch_by_identifier(&self, identifier: &str) -> Result<MovieInfo> {
        let id = identifier.strip_prefix(ID_PREFIX).unwrap_or(identifier);
        if let Some(cached) = self.cache.lookup(&[id], INFO_TABLE)? {
            debug!(id, "info served from cache");
            return Ok(cached);
        }

        info!(id, "fetching from provider");
        let mut record = self.provider.fetch_by_id(id)?;
        let missing: Vec<&str> = REQUIRED_DETAIL_SETS
            .iter()
            .copied()
            .filter(|set| !record.current_detail_sets().contains(*set))
            .collect();
        if !missing.is_empty() {
            debug!(id, ?missing, "loading missing detail sets");
            self.provider.load_details(&mut record, &missing)?;
        }

        let movie_info = build_info(&record);
        self.cache.store(&movie_info, &[id], INFO_TABLE, None)?;
        Ok(movie_info)
    }

    /// Returns `info` unchanged when it was built with every required detail
    /// set; otherwise discards it and re-fetches fully. Search results are
    /// sparse, so this is how a caller upgrades a selected result.
    pub fn ensure_complete(&self, movie_info: MovieInfo) -> Result<MovieInfo> {
        let complete = REQUIRED_DETAIL_SETS
            .iter()
            .all(|set| movie_info.detail_sets.contains(*set));
        if complete {
            return Ok(movie_info);
        }
        debug!(id = %movie_info.id, "detail sets incomplete, re-fetching");
        self.fetch_by_identifier(&movie_info.id)
    }
}

/// Orders match-filtered records by tier, each tier sorted by (title, year)
/// descending.
fn rank_matches(candidates: Vec<RawRecord>, query: &str) -> Vec<RawRecord> {
    let mut exact = Vec::new();
    let mut sub = Vec::new();
    let mut superset = Vec::new();
    let mut other = Vec::new();

    for record in candidates {
        let title = extract::title(&record).unwrap_or_default().to_lowercase();
        if title == query {
            exact.push(record);
        } else if query.contains(&title) {
            sub.push(record);
        } else if title.contains(query) {
            superset.push(record);
        } else {
            other.push(record);
        }
    }

    let mut ranked = Vec::new();
    for mut tier in [exact, sub, superset, other] {
        tier.sort_by(|a, b| {
            let key_a = (extract::title(a), extract::year(a));
            let key_b = (extract::title(b), extract::year(b));
            key_b.cmp(&key_a)
        });
        ranked.extend(tier);
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SqliteStore;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    struct MockProvider {
        search_results: Vec<(String, Value)>,
        fetch_fields: Value,
        preloaded_sets: Vec<&'static str>,
        search_calls: Mutex<u32>,
        fetch_calls: Mutex<u32>,
        detail_requests: Mutex<Vec<Vec<String>>>,
    }

    impl MockProvider {
        fn new(fetch_fields: Value) -> Self {
            Self {
                search_results: Vec::new(),
                fetch_fields,
                preloaded_sets: vec!["main"],
                search_calls: Mutex::new(0),
                fetch_calls: Mutex::new(0),
                detail_requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl MetadataProvider for MockProvider {
        fn search_by_text(&self, _text: &str) -> Result<Vec<RawRecord>> {
            *self.search_calls.lock().unwrap() += 1;
            self.search_results
                .iter()
                .map(|(id, fields)| RawRecord::from_value(id.clone(), fields.clone()))
                .collect()
        }

        fn fetch_by_id(&self, id: &str) -> Result<RawRecord> {
            *self.fetch_calls.lock().unwrap() += 1;
            let mut record = RawRecord::from_value(id, self.fetch_fields.clone())?;
            record.mark_detail_sets(self.preloaded_sets.iter().copied());
            Ok(record)
        }

        fn load_details(&self, record: &mut RawRecord, sets: &[&str]) -> Result<()> {
            self.detail_requests
                .lock()
                .unwrap()
                .push(sets.iter().map(|s| s.to_string()).collect());
            record.mark_detail_sets(sets.iter().copied());
            Ok(())
        }
    }

    fn service(provider: MockProvider) -> MetadataService<MockProvider> {
        let cache = ExpiringCache::new(Box::new(SqliteStore::open_in_memory().unwrap()));
        MetadataService::new(provider, cache)
    }

    #[test]
    fn search_filters_non_movies_and_non_matches() {
        let mut provider = MockProvider::new(json!({}));
        provider.search_results = vec![
            (
                "0001".into(),
                json!({"title": "Pirates", "kind": "movie", "year": 2005}),
            ),
            (
                "0002".into(),
                json!({"title": "Pirates", "kind": "tv series", "year": 2010}),
            ),
            (
                "0003".into(),
                json!({"title": "Buccaneers", "kind": "movie", "year": 1999}),
            ),
        ];

        let results = service(provider).search("pirates").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "0001");
    }

    #[test]
    fn search_matches_against_alternate_titles() {
        let mut provider = MockProvider::new(json!({}));
        provider.search_results = vec![(
            "0004".into(),
            json!({
                "title": "Die Piraten",
                "kind": "movie",
                "akas": ["Pirates::USA release"],
            }),
        )];

        let results = service(provider).search("pirates").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "0004");
    }

    #[test]
    fn search_ranks_matches_into_priority_tiers() {
        let mut provider = MockProvider::new(json!({}));
        provider.search_results = vec![
            // other: title unrelated, aka matches the query
            (
                "other".into(),
                json!({"title": "Booty", "kind": "movie", "akas": ["Pirates of the Sea"]}),
            ),
            // super: query is a substring of the title
            (
                "super".into(),
                json!({"title": "Pirates of the Sea II", "kind": "movie",
                       "akas": ["Pirates of the Sea"]}),
            ),
            // sub: title is a substring of the query
            (
                "sub".into(),
                json!({"title": "Pirates", "kind": "movie", "akas": ["Pirates of the Sea"]}),
            ),
            // exact title match
            (
                "exact".into(),
                json!({"title": "Pirates of the Sea", "kind": "movie"}),
            ),
        ];

        let results = service(provider).search("pirates of the sea").unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "sub", "super", "other"]);
    }

    #[test]
    fn tiers_sort_by_title_and_year_descending() {
        let mut provider = MockProvider::new(json!({}));
        provider.search_results = vec![
            (
                "remake".into(),
                json!({"title": "Pirates", "kind": "movie", "year": 1986}),
            ),
            (
                "recent".into(),
                json!({"title": "Pirates", "kind": "movie", "year": 2005}),
            ),
        ];

        let results = service(provider).search("pirates").unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["recent", "remake"]);
    }

    #[test]
    fn search_results_are_served_from_cache_on_repeat() {
        let mut provider = MockProvider::new(json!({}));
        provider.search_results = vec![(
            "0001".into(),
            json!({"title": "Pirates", "kind": "movie", "year": 2005}),
        )];
        let service = service(provider);

        let first = service.search("pirates").unwrap();
        let second = service.search("pirates").unwrap();
        assert_eq!(first, second);
        assert_eq!(*service.provider.search_calls.lock().unwrap(), 1);
    }

    #[test]
    fn fetch_strips_provider_prefix_and_caches() {
        let provider = MockProvider::new(json!({"title": "The Matrix", "year": 1999}));
        let service = service(provider);

        let first = service.fetch_by_identifier("tt0133093").unwrap();
        assert_eq!(first.id, "0133093");

        // the bare identifier addresses the same cache entry
        let second = service.fetch_by_identifier("0133093").unwrap();
        assert_eq!(first, second);
        assert_eq!(*service.provider.fetch_calls.lock().unwrap(), 1);
    }

    #[test]
    fn fetch_requests_only_missing_detail_sets() {
        let mut provider = MockProvider::new(json!({"title": "The Matrix"}));
        provider.preloaded_sets = vec!["main", "plot"];
        let service = service(provider);

        service.fetch_by_identifier("0133093").unwrap();

        let requests = service.provider.detail_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0], vec!["release dates", "akas", "taglines", "dvd"]);
    }

    #[test]
    fn ensure_complete_returns_complete_info_unchanged() {
        let provider = MockProvider::new(json!({"title": "The Matrix"}));
        let service = service(provider);

        let mut record =
            RawRecord::from_value("0133093", json!({"title": "The Matrix"})).unwrap();
        record.mark_detail_sets(REQUIRED_DETAIL_SETS);
        let complete = build_info(&record);

        let returned = service.ensure_complete(complete.clone()).unwrap();
        assert_eq!(returned, complete);
        assert_eq!(*service.provider.fetch_calls.lock().unwrap(), 0);
    }

    #[test]
    fn ensure_complete_refetches_when_detail_sets_are_missing() {
        let provider = MockProvider::new(json!({"title": "The Matrix", "year": 1999}));
        let service = service(provider);

        // sparse record, as a search result would produce
        let record = RawRecord::from_value("0133093", json!({"title": "The Matrix"})).unwrap();
        let sparse = build_info(&record);

        let upgraded = service.ensure_complete(sparse).unwrap();
        assert_eq!(*service.provider.fetch_calls.lock().unwrap(), 1);
        assert_eq!(upgraded.year, Some(1999));
        for set in REQUIRED_DETAIL_SETS {
            assert!(upgraded.detail_sets.contains(set));
        }
    }
}
