use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegionKind {
    Park,
    Subdivision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegionScope {
    #[default]
    Subdivisions,
    Parks,
}

impl RegionScope {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "subdivisions" | "states" | "state" => Some(RegionScope::Subdivisions),
            "parks" | "park" => Some(RegionScope::Parks),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub id: String,
    pub name: String,
    pub country_code: String,
    pub country_name: String,
    pub kind: RegionKind,
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
struct CountryRegions {
    name: String,
    subdivisions: Vec<(String, String)>,
    parks: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    countries: HashMap<String, CountryRegions>,
}

impl RegionCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Arc<Self> {
        Arc::clone(&BUILTIN_CATALOG)
    }

    pub fn with_subdivisions(
        mut self,
        country_code: &str,
        country_name: &str,
        subdivisions: &[(&str, &str)],
    ) -> Self {
        let entry = self.country_entry(country_code, country_name);
        entry.subdivisions.extend(
            subdivisions
                .iter()
                .map(|(code, name)| (code.to_string(), name.to_string())),
        );
        self
    }

    pub fn with_parks(mut self, country_code: &str, country_name: &str, parks: &[&str]) -> Self {
        let entry = self.country_entry(country_code, country_name);
        entry.parks.extend(parks.iter().map(|park| park.to_string()));
        self
    }

    fn country_entry(&mut self, country_code: &str, country_name: &str) -> &mut CountryRegions {
        self.countries
            .entry(country_code.trim().to_ascii_uppercase())
            .or_insert_with(|| CountryRegions {
                name: country_name.to_string(),
                ..CountryRegions::default()
            })
    }
}

#[derive(Debug, Clone)]
pub struct RegionEnumerator {
    catalog: Arc<RegionCatalog>,
    scope: RegionScope,
}

impl Default for RegionEnumerator {
    fn default() -> Self {
        Self::new(RegionCatalog::builtin(), RegionScope::Subdivisions)
    }
}

impl RegionEnumerator {
    pub fn new(catalog: Arc<RegionCatalog>, scope: RegionScope) -> Self {
        Self { catalog, scope }
    }

    pub fn list_regions(&self, country_code: &str, limit_per_region: usize) -> Vec<Region> {
        let code = country_code.trim().to_ascii_uppercase();
        let Some(country) = self.catalog.countries.get(&code) else {
            return Vec::new();
        };

        match self.scope {
            RegionScope::Subdivisions => country
                .subdivisions
                .iter()
                .map(|(id, name)| Region {
                    id: id.clone(),
                    name: name.clone(),
                    country_code: code.clone(),
                    country_name: country.name.clone(),
                    kind: RegionKind::Subdivision,
                    limit: limit_per_region,
                })
                .collect(),
            RegionScope::Parks => country
                .parks
                .iter()
                .map(|name| Region {
                    id: slugify(name),
                    name: name.clone(),
                    country_code: code.clone(),
                    country_name: country.name.clone(),
                    kind: RegionKind::Park,
                    limit: limit_per_region,
                })
                .collect(),
        }
    }
}

pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

static BUILTIN_CATALOG: Lazy<Arc<RegionCatalog>> = Lazy::new(|| {
    Arc::new(
        RegionCatalog::empty()
            .with_subdivisions("US", "United States", US_STATES)
            .with_parks("US", "United States", US_NATIONAL_PARKS)
            .with_subdivisions("CA", "Canada", CA_PROVINCES)
            .with_parks("CA", "Canada", CA_NATIONAL_PARKS)
            .with_subdivisions("IN", "India", IN_STATES),
    )
});

const US_STATES: &[(&str, &str)] = &[
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("DC", "District of Columbia"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
];

const US_NATIONAL_PARKS: &[&str] = &[
    "Acadia",
    "American Samoa",
    "Arches",
    "Badlands",
    "Big Bend",
    "Biscayne",
    "Black Canyon of the Gunnison",
    "Bryce Canyon",
    "Canyonlands",
    "Capitol Reef",
    "Carlsbad Caverns",
    "Channel Islands",
    "Congaree",
    "Crater Lake",
    "Cuyahoga Valley",
    "Death Valley",
    "Denali",
    "Dry Tortugas",
    "Everglades",
    "Gates of the Arctic",
    "Gateway Arch",
    "Glacier",
    "Glacier Bay",
    "Grand Canyon",
    "Grand Teton",
    "Great Basin",
    "Great Sand Dunes",
    "Great Smoky Mountains",
    "Guadalupe Mountains",
    "Haleakala",
    "Hawaii Volcanoes",
    "Hot Springs",
    "Indiana Dunes",
    "Isle Royale",
    "Joshua Tree",
    "Katmai",
    "Kenai Fjords",
    "Kings Canyon",
    "Kobuk Valley",
    "Lake Clark",
    "Lassen Volcanic",
    "Mammoth Cave",
    "Mesa Verde",
    "Mount Rainier",
    "New River Gorge",
    "North Cascades",
    "Olympic",
    "Petrified Forest",
    "Pinnacles",
    "Redwood",
    "Rocky Mountain",
    "Saguaro",
    "Sequoia",
    "Shenandoah",
    "Theodore Roosevelt",
    "Virgin Islands",
    "Voyageurs",
    "White Sands",
    "Wind Cave",
    "Wrangell-St. Elias",
    "Yellowstone",
    "Yosemite",
    "Zion",
];

const CA_PROVINCES: &[(&str, &str)] = &[
    ("AB", "Alberta"),
    ("BC", "British Columbia"),
    ("MB", "Manitoba"),
    ("NB", "New Brunswick"),
    ("NL", "Newfoundland and Labrador"),
    ("NS", "Nova Scotia"),
    ("NT", "Northwest Territories"),
    ("NU", "Nunavut"),
    ("ON", "Ontario"),
    ("PE", "Prince Edward Island"),
    ("QC", "Quebec"),
    ("SK", "Saskatchewan"),
    ("YT", "Yukon"),
];

const CA_NATIONAL_PARKS: &[&str] = &[
    "Banff",
    "Jasper",
    "Yoho",
    "Kootenay",
    "Glacier",
    "Mount Revelstoke",
    "Waterton Lakes",
    "Pacific Rim",
    "Gwaii Haanas",
    "Elk Island",
    "Wood Buffalo",
    "Prince Albert",
    "Grasslands",
    "Riding Mountain",
    "Bruce Peninsula",
    "Pukaskwa",
    "La Mauricie",
    "Forillon",
    "Fundy",
    "Kouchibouguac",
    "Cape Breton Highlands",
    "Kejimkujik",
    "Gros Morne",
    "Terra Nova",
    "Kluane",
    "Nahanni",
    "Auyuittuq",
];

const IN_STATES: &[(&str, &str)] = &[
    ("AP", "Andhra Pradesh"),
    ("AR", "Arunachal Pradesh"),
    ("AS", "Assam"),
    ("BR", "Bihar"),
    ("CT", "Chhattisgarh"),
    ("GA", "Goa"),
    ("GJ", "Gujarat"),
    ("HR", "Haryana"),
    ("HP", "Himachal Pradesh"),
    ("JH", "Jharkhand"),
    ("KA", "Karnataka"),
    ("KL", "Kerala"),
    ("MP", "Madhya Pradesh"),
    ("MH", "Maharashtra"),
    ("MN", "Manipur"),
    ("ML", "Meghalaya"),
    ("MZ", "Mizoram"),
    ("NL", "Nagaland"),
    ("OR", "Odisha"),
    ("PB", "Punjab"),
    ("RJ", "Rajasthan"),
    ("SK", "Sikkim"),
    ("TN", "Tamil Nadu"),
    ("TG", "Telangana"),
    ("TR", "Tripura"),
    ("UP", "Uttar Pradesh"),
    ("UT", "Uttarakhand"),
    ("WB", "West Bengal"),
    ("AN", "Andaman and Nicobar Islands"),
    ("CH", "Chandigarh"),
    ("DH", "Dadra and Nagar Haveli and Daman and Diu"),
    ("DL", "Delhi"),
    ("JK", "Jammu and Kashmir"),
    ("LA", "Ladakh"),
    ("LD", "Lakshadweep"),
    ("PY", "Puducherry"),
];
