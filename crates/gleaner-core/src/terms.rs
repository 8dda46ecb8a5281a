//! Search term and curated collection catalogs.
//!
//! The term sequence is a pure function of the [`TermCatalog`]: the same
//! catalog always yields the same terms in the same order, so a run can be
//! resumed by skipping the first N terms.

use std::collections::HashSet;

/// Category label for results whose term carries no category.
pub const MIXED_CATEGORY: &str = "mixed";

/// One discrete query driving the search strategy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SearchTerm {
    /// A release-year bucket, e.g. `year:1985`.
    Temporal { query: String, category: String },
    /// A contributing entity, e.g. `artist:Queen`.
    Attribution { query: String, category: String },
    /// A category tag, e.g. `genre:jazz`.
    Category { query: String, category: String },
    /// A free keyword, e.g. `hits`.
    Keyword { query: String, category: String },
}

impl SearchTerm {
    pub fn temporal(year: u16) -> Self {
        SearchTerm::Temporal {
            query: format!("year:{year}"),
            category: year.to_string(),
        }
    }

    pub fn attribution(name: &str) -> Self {
        SearchTerm::Attribution {
            query: format!("artist:{name}"),
            category: name.trim().to_string(),
        }
    }

    pub fn category(tag: &str) -> Self {
        SearchTerm::Category {
            query: format!("genre:{tag}"),
            category: tag.trim().to_string(),
        }
    }

    /// A bare keyword is labelled with itself only when it is also a known
    /// category tag.
    pub fn keyword(word: &str, is_category: bool) -> Self {
        let category = if is_category {
            word.to_string()
        } else {
            MIXED_CATEGORY.to_string()
        };
        SearchTerm::Keyword {
            query: word.to_string(),
            category,
        }
    }

    /// The literal query string sent upstream.
    pub fn query(&self) -> &str {
        match self {
            SearchTerm::Temporal { query, .. }
            | SearchTerm::Attribution { query, .. }
            | SearchTerm::Category { query, .. }
            | SearchTerm::Keyword { query, .. } => query,
        }
    }

    /// The category label assigned to records found under this term.
    pub fn category_label(&self) -> &str {
        match self {
            SearchTerm::Temporal { category, .. }
            | SearchTerm::Attribution { category, .. }
            | SearchTerm::Category { category, .. }
            | SearchTerm::Keyword { category, .. } => category,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            SearchTerm::Temporal { .. } => "temporal",
            SearchTerm::Attribution { .. } => "attribution",
            SearchTerm::Category { .. } => "category",
            SearchTerm::Keyword { .. } => "keyword",
        }
    }
}

/// The four fixed catalogs the search strategy sweeps.
#[derive(Debug, Clone)]
pub struct TermCatalog {
    /// First year bucket (inclusive).
    pub year_start: u16,
    /// Year sweep end (exclusive).
    pub year_end: u16,
    pub year_step: u16,
    pub attributions: Vec<String>,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
}

impl TermCatalog {
    /// Lazily generate the ordered term sequence: temporal buckets, then
    /// attribution names, category tags and keywords.
    ///
    /// Terms whose query repeats an earlier one are emitted only once.
    pub fn terms(&self) -> impl Iterator<Item = SearchTerm> + Clone + '_ {
        let step = usize::from(self.year_step.max(1));
        let years = (self.year_start..self.year_end)
            .step_by(step)
            .map(SearchTerm::temporal);
        let attributions = self
            .attributions
            .iter()
            .map(|name| SearchTerm::attribution(name));
        let categories = self.categories.iter().map(|tag| SearchTerm::category(tag));
        let keywords = self
            .keywords
            .iter()
            .map(|word| SearchTerm::keyword(word, self.categories.contains(word)));

        let mut seen = HashSet::new();
        years
            .chain(attributions)
            .chain(categories)
            .chain(keywords)
            .filter(move |term| seen.insert(term.query().to_string()))
    }

    pub fn len(&self) -> usize {
        self.terms().count()
    }

    pub fn is_empty(&self) -> bool {
        self.terms().next().is_none()
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for TermCatalog {
    fn default() -> Self {
        Self {
            year_start: 1960,
            year_end: 2025,
            year_step: 5,
            attributions: owned(&[
                "Taylor Swift",
                "Drake",
                "The Weeknd",
                "Ed Sheeran",
                "Ariana Grande",
                "Post Malone",
                "Billie Eilish",
                "Dua Lipa",
                "Bad Bunny",
                "The Beatles",
                "Queen",
                "Eminem",
                "Kanye West",
                "Rihanna",
                "Beyonce",
                "Justin Bieber",
                "Bruno Mars",
                "Adele",
                "Coldplay",
                "Imagine Dragons",
                "Maroon 5",
                "Kendrick Lamar",
                "Travis Scott",
                "J. Cole",
                "SZA",
                "Doja Cat",
                "Olivia Rodrigo",
                "Harry Styles",
                "Lana Del Rey",
                "Michael Jackson",
                "Elvis Presley",
                "Madonna",
                "Prince",
                "David Bowie",
                "Bob Dylan",
                "The Rolling Stones",
                "Led Zeppelin",
                "Pink Floyd",
                "Nirvana",
                "Radiohead",
                "U2",
                "Red Hot Chili Peppers",
                "Foo Fighters",
                "Linkin Park",
                "Green Day",
                "Blink-182",
                "Metallica",
                "AC/DC",
                "Jay-Z",
                "Nas",
                "Tupac",
                "Biggie",
                "50 Cent",
                "Snoop Dogg",
                "Frank Sinatra",
                "Ella Fitzgerald",
                "Louis Armstrong",
                "Miles Davis",
                "John Coltrane",
                "Duke Ellington",
                "Charlie Parker",
                "Thelonious Monk",
            ]),
            categories: owned(&[
                "pop",
                "rock",
                "hip hop",
                "rap",
                "electronic",
                "edm",
                "house",
                "techno",
                "jazz",
                "country",
                "r&b",
                "soul",
                "reggae",
                "indie",
                "alternative",
                "metal",
                "punk",
                "folk",
                "blues",
                "classical",
                "k-pop",
                "j-pop",
                "latin",
                "salsa",
                "bossa nova",
                "funk",
                "disco",
                "gospel",
                "bluegrass",
            ]),
            keywords: owned(&[
                "hits", "popular", "top", "best", "classic", "new", "trending", "viral", "chart",
                "billboard", "hot", "fresh", "latest",
            ]),
        }
    }
}

/// A curated collection enumerated by the collections strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuratedCollection {
    pub id: String,
    pub name: String,
}

impl CuratedCollection {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Category label derived from the collection name.
    pub fn category(&self) -> &'static str {
        let name = self.name.to_lowercase();
        if name.contains("pop") {
            "pop"
        } else if name.contains("rock") {
            "rock"
        } else if name.contains("hip") || name.contains("rap") {
            "hip hop"
        } else if name.contains("jazz") {
            "jazz"
        } else if name.contains("country") {
            "country"
        } else if name.contains("electronic") || name.contains("edm") {
            "electronic"
        } else {
            MIXED_CATEGORY
        }
    }
}

/// Drop collections whose id repeats an earlier entry, keeping order.
pub fn unique_collections(collections: &[CuratedCollection]) -> Vec<CuratedCollection> {
    let mut seen = HashSet::new();
    collections
        .iter()
        .filter(|c| seen.insert(c.id.clone()))
        .cloned()
        .collect()
}

pub fn default_collections() -> Vec<CuratedCollection> {
    [
        ("37i9dQZF1DXcBWIGoYBM5M", "Today's Top Hits"),
        ("37i9dQZF1DX0XUsuxWHRQd", "RapCaviar"),
        ("37i9dQZF1DX4o1oenSJRJd", "All Out 80s"),
        ("37i9dQZF1DX76t638VZCAQ", "Rock Classics"),
        ("37i9dQZF1DXbITWG1ZJKYt", "Jazz Classics"),
        ("37i9dQZF1DX4sWSpwq3LiO", "Peaceful Piano"),
        ("37i9dQZF1DX4sSPT1KXqQO", "Country Top 50"),
        ("37i9dQZF1DX4JAvHpjipBk", "New Music Friday"),
        ("37i9dQZF1DXcF6B6QPhFDv", "Hot Country"),
        ("37i9dQZF1DX10zKzsJ2jqH", "Pop Rising"),
        ("37i9dQZF1DX0kbJZpiYdSz", "Hip-Hop Central"),
        ("37i9dQZF1DX4dyzvuaRJ0n", "Chill Hits"),
        ("37i9dQZF1DX4UtSsGT1Sbe", "All New Indie"),
        ("37i9dQZF1DX2sUQwD7tbmL", "Feel Good Friday"),
    ]
    .into_iter()
    .map(|(id, name)| CuratedCollection::new(id, name))
    .collect()
}
