pub mod client;
pub mod detection;
pub mod nutrition;
pub mod parse;

pub use client::{GeminiClient, GeminiError};
pub use detection::{FoodDetector, GeminiFoodDetector};
pub use nutrition::{GeminiNutritionAnalyzer, NutritionAnalyzer};
