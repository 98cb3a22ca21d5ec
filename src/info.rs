use crate::extract::{self, DvdRelease, MpaaRating, ReleaseDate, Runtime};
use crate::provider::RawRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Canonical, provider-independent movie record. Immutable once built; the
/// same value is shared between the cache and callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieInfo {
    /// Canonical identifier without any provider prefix
    pub id: String,
    pub title: Option<String>,
    /// Provider title variants, de-duplicated in provider order
    pub titles: Vec<String>,
    /// Every name this movie could go by; always a superset of `title`,
    /// `titles` and the alternate-title locale titles
    pub all_titles: Vec<String>,
    pub alternate_titles: Option<BTreeMap<String, Option<String>>>,
    pub mpaa: Option<MpaaRating>,
    pub cast: Option<Vec<String>>,
    pub director: Option<Vec<String>>,
    pub producer: Option<Vec<String>>,
    pub writers: Option<Vec<String>>,
    pub genres: Option<Vec<String>>,
    pub kind: Option<String>,
    pub plot: Option<String>,
    pub plot_outline: Option<String>,
    pub rating: Option<f64>,
    pub votes: Option<u64>,
    pub top250: Option<u64>,
    pub year: Option<i32>,
    pub runtimes: Option<Vec<Runtime>>,
    pub release_dates: Option<BTreeMap<String, Vec<ReleaseDate>>>,
    pub dvd_releases: Option<Vec<DvdRelease>>,
    pub taglines: Option<Vec<String>>,
    /// Provider detail sets that were loaded when this record was built;
    /// consulted later to decide whether a re-fetch is needed
    pub detail_sets: BTreeSet<String>,
}

/// Runs every field-extraction rule against one raw record and assembles the
/// canonical structure. Deterministic and I/O-free; a structurally valid
/// record always builds, however sparse.
pub fn build_info(record: &RawRecord) -> MovieInfo {
    MovieInfo {
        id: record.id().to_string(),
        title: extract::title(record),
        titles: extract::title_variants(record),
        all_titles: extract::all_titles(record),
        alternate_titles: extract::alternate_titles(record),
        mpaa: extract::mpaa(record),
        cast: extract::cast(record),
        director: extract::director(record),
        producer: extract::producer(record),
        writers: extract::writers(record),
        genres: extract::genres(record),
        kind: extract::kind(record),
        plot: extract::plot(record),
        plot_outline: extract::plot_outline(record),
        rating: extract::rating(record),
        votes: extract::votes(record),
        top250: extract::top250(record),
        year: extract::year(record),
        runtimes: extract::runtimes(record),
        release_dates: extract::release_dates(record),
        dvd_releases: extract::dvd_releases(record),
        taglines: extract::taglines(record),
        detail_sets: record.current_detail_sets().clone(),
    }
}
