//! Barcode product models and parsing of remote product payloads.
//!
//! Network access lives in [`crate::http`]; everything here is pure so the
//! payload mapping can be tested without a server.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Result, TrackerError};

/// Where a product record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductSource {
    OpenFoodFacts,
    Usda,
    Manual,
}

impl ProductSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductSource::OpenFoodFacts => "openfoodfacts",
            ProductSource::Usda => "usda",
            ProductSource::Manual => "manual",
        }
    }
}

impl fmt::Display for ProductSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductSource {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "openfoodfacts" => Ok(ProductSource::OpenFoodFacts),
            "usda" => Ok(ProductSource::Usda),
            "manual" => Ok(ProductSource::Manual),
            other => Err(TrackerError::invalid_input(
                "data_source",
                format!("unknown source '{}'", other),
            )),
        }
    }
}

/// A packaged food identified by its barcode. Nutrition is per 100 g.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarcodeProduct {
    pub barcode: String,
    pub product_name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub calories: Option<f64>,
    #[serde(default)]
    pub proteins: Option<f64>,
    #[serde(default)]
    pub carbs: Option<f64>,
    #[serde(default)]
    pub fats: Option<f64>,
    #[serde(default)]
    pub fiber: Option<f64>,
    #[serde(default)]
    pub sugar: Option<f64>,
    #[serde(default)]
    pub sodium: Option<f64>,

    #[serde(default)]
    pub serving_size: Option<String>,
    #[serde(default = "default_serving_unit")]
    pub serving_unit: String,
    #[serde(default)]
    pub ingredients: Option<String>,
    #[serde(default)]
    pub allergens: Vec<String>,

    pub data_source: ProductSource,
    /// 0-100, based on how complete the nutrition data is
    #[serde(default)]
    pub quality_score: u8,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub product_url: Option<String>,
}

fn default_serving_unit() -> String {
    "g".to_string()
}

impl BarcodeProduct {
    /// Minimal product with only the required fields set.
    pub fn new(barcode: &str, product_name: &str, data_source: ProductSource) -> Self {
        Self {
            barcode: barcode.to_string(),
            product_name: product_name.to_string(),
            brand: None,
            category: None,
            calories: None,
            proteins: None,
            carbs: None,
            fats: None,
            fiber: None,
            sugar: None,
            sodium: None,
            serving_size: None,
            serving_unit: default_serving_unit(),
            ingredients: None,
            allergens: Vec::new(),
            data_source,
            quality_score: 0,
            image_url: None,
            product_url: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_barcode(&self.barcode)?;
        if self.product_name.trim().is_empty() {
            return Err(TrackerError::invalid_input("product_name", "must not be empty"));
        }
        if self.quality_score > 100 {
            return Err(TrackerError::invalid_input(
                "quality_score",
                "must be between 0 and 100",
            ));
        }
        Ok(())
    }
}

/// Barcodes are 8 to 20 characters long.
pub fn validate_barcode(barcode: &str) -> Result<()> {
    let len = barcode.chars().count();
    if !(8..=20).contains(&len) {
        return Err(TrackerError::invalid_input(
            "barcode",
            format!("length {} outside 8-20", len),
        ));
    }
    Ok(())
}

/// Barcode lookup request from the scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarcodeScanRequest {
    pub barcode: String,
    /// Remote sources tried in order. Default: Open Food Facts, then USDA
    #[serde(default = "default_sources")]
    pub preferred_sources: Vec<ProductSource>,
    /// Skip the local cache
    #[serde(default)]
    pub force_refresh: bool,
}

fn default_sources() -> Vec<ProductSource> {
    vec![ProductSource::OpenFoodFacts, ProductSource::Usda]
}

impl BarcodeScanRequest {
    pub fn new(barcode: &str) -> Self {
        Self {
            barcode: barcode.to_string(),
            preferred_sources: default_sources(),
            force_refresh: false,
        }
    }
}

/// Response to a barcode search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarcodeSearchResponse {
    pub found: bool,
    pub product: Option<BarcodeProduct>,
    pub alternatives: Vec<BarcodeProduct>,
    pub cache_hit: bool,
    pub response_time_ms: u64,
}

fn first_entry(list: Option<&str>) -> Option<String> {
    list.and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Map an Open Food Facts `product/{barcode}.json` payload.
///
/// Returns `None` when the payload reports the product as missing.
pub fn parse_openfoodfacts(barcode: &str, payload: &Value) -> Option<BarcodeProduct> {
    let status_ok = match payload.get("status") {
        Some(Value::Number(n)) => n.as_i64() != Some(0),
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        _ => false,
    };
    let product = payload.get("product").filter(|p| p.is_object())?;
    if !status_ok {
        return None;
    }

    let text = |key: &str| product.get(key).and_then(Value::as_str);
    let empty = serde_json::Map::new();
    let nutriments = product
        .get("nutriments")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let nutrient = |key: &str| nutriments.get(key).and_then(Value::as_f64);

    let filled = nutriments.values().filter(|v| !v.is_null()).count();

    Some(BarcodeProduct {
        product_name: text("product_name")
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown Product")
            .to_string(),
        brand: first_entry(text("brands")),
        category: first_entry(text("categories")),
        calories: nutrient("energy-kcal_100g"),
        proteins: nutrient("proteins_100g"),
        carbs: nutrient("carbohydrates_100g"),
        fats: nutrient("fat_100g"),
        fiber: nutrient("fiber_100g"),
        sugar: nutrient("sugars_100g"),
        sodium: nutrient("sodium_100g"),
        ingredients: text("ingredients_text").map(str::to_string),
        allergens: text("allergens")
            .map(|s| {
                s.split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
        quality_score: (filled * 10).min(100) as u8,
        image_url: text("image_url").map(str::to_string),
        product_url: Some(format!("https://world.openfoodfacts.org/product/{}", barcode)),
        ..BarcodeProduct::new(barcode, "", ProductSource::OpenFoodFacts)
    })
}

// FoodData Central nutrient numbers
const FDC_ENERGY_KCAL: &str = "208";
const FDC_PROTEIN: &str = "203";
const FDC_FAT: &str = "204";
const FDC_CARBS: &str = "205";
const FDC_FIBER: &str = "291";
const FDC_SUGARS: &str = "269";
const FDC_SODIUM_MG: &str = "307";

/// Map a USDA FoodData Central `foods/search` payload.
///
/// Picks the first branded food whose `gtinUpc` matches the barcode (leading
/// zeros ignored). Sodium is converted from mg to g to match Open Food Facts.
pub fn parse_usda(barcode: &str, payload: &Value) -> Option<BarcodeProduct> {
    let wanted = barcode.trim_start_matches('0');
    let food = payload
        .get("foods")?
        .as_array()?
        .iter()
        .find(|f| {
            f.get("gtinUpc")
                .and_then(Value::as_str)
                .is_some_and(|upc| upc.trim_start_matches('0') == wanted)
        })?;

    let nutrients = food.get("foodNutrients").and_then(Value::as_array);
    let nutrient = |number: &str| {
        nutrients?.iter().find_map(|n| {
            let matches = n.get("nutrientNumber").and_then(Value::as_str) == Some(number);
            if matches {
                n.get("value").and_then(Value::as_f64)
            } else {
                None
            }
        })
    };
    let text = |key: &str| {
        food.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let mut product = BarcodeProduct {
        brand: text("brandOwner").or_else(|| text("brandName")),
        category: text("foodCategory"),
        calories: nutrient(FDC_ENERGY_KCAL),
        proteins: nutrient(FDC_PROTEIN),
        carbs: nutrient(FDC_CARBS),
        fats: nutrient(FDC_FAT),
        fiber: nutrient(FDC_FIBER),
        sugar: nutrient(FDC_SUGARS),
        sodium: nutrient(FDC_SODIUM_MG).map(|mg| mg / 1000.0),
        serving_size: food
            .get("servingSize")
            .and_then(Value::as_f64)
            .map(|v| v.to_string()),
        serving_unit: text("servingSizeUnit")
            .map(|u| u.to_lowercase())
            .unwrap_or_else(default_serving_unit),
        ingredients: text("ingredients"),
        product_url: food
            .get("fdcId")
            .and_then(Value::as_i64)
            .map(|id| format!("https://fdc.nal.usda.gov/fdc-app.html#/food-details/{}", id)),
        ..BarcodeProduct::new(
            barcode,
            &text("description").unwrap_or_else(|| "Unknown Product".to_string()),
            ProductSource::Usda,
        )
    };

    let filled = [
        product.calories,
        product.proteins,
        product.carbs,
        product.fats,
        product.fiber,
        product.sugar,
        product.sodium,
    ]
    .iter()
    .filter(|v| v.is_some())
    .count();
    product.quality_score = (filled * 10).min(100) as u8;

    Some(product)
}
