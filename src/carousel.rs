//! Guided requests from the storefront carousel.
//!
//! Carousel prompts are canned questions, so the assistant can steer the
//! model for them and answer deterministically when the model is down.

use crate::catalog::{case_insensitive, CatalogFilter};
use crate::models::CatalogProduct;

pub const SHIPPING_INFO: &str = "FashionHub menyediakan beberapa metode pengiriman sebagai berikut:

1. Regular (2-3 hari kerja)
   - JNE Regular: Rp15.000 - Rp25.000
   - SiCepat REG: Rp15.000 - Rp25.000

2. Express (1-2 hari kerja)
   - JNE YES: Rp20.000 - Rp35.000
   - SiCepat BEST: Rp20.000 - Rp35.000
   - AnterAja Express: Rp20.000 - Rp35.000

3. Same Day (pengiriman di hari yang sama)
   - Gosend Instant: Rp25.000 - Rp45.000 (khusus area tertentu)

Tarif pengiriman bergantung pada berat paket dan jarak pengiriman. Estimasi biaya pengiriman akan muncul saat checkout.";

pub const APOLOGY: &str = "Mohon maaf, saya sedang mengalami gangguan teknis. Silakan coba lagi dalam beberapa saat atau hubungi tim dukungan kami. 😊";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarouselTopic {
    /// "Rekomendasi outfit untuk acara casual weekend"
    Outfit,
    /// "Produk fashion terlaris minggu ini"
    BestSellers,
    /// "Informasi metode pengiriman"
    Shipping,
    General,
}

impl CarouselTopic {
    pub fn detect(input: &str) -> Self {
        let lower = input.to_lowercase();
        if lower.contains("outfit") {
            Self::Outfit
        } else if lower.contains("terlaris") || lower.contains("produk") {
            Self::BestSellers
        } else if lower.contains("pengiriman") {
            Self::Shipping
        } else {
            Self::General
        }
    }

    /// Extra system instruction sent ahead of the model call.
    pub fn steering(self) -> Option<&'static str> {
        match self {
            Self::Outfit => Some(
                "Berikan rekomendasi outfit casual dengan fokus pada produk T-shirt dan celana, \
                 dan beri contoh outfit yang cocok dari database. Sebutkan merek Erigo dalam rekomendasi.",
            ),
            Self::BestSellers => Some(
                "Berikan informasi tentang produk terlaris FashionHub, utamakan T-shirt dan Pants \
                 dari Erigo yang ada di database. Jangan rekomendasikan produk yang tidak ada di database.",
            ),
            Self::Shipping => Some(
                "Berikan informasi tentang metode pengiriman di FashionHub, termasuk jenis pengiriman, \
                 estimasi waktu, dan biaya. Format informasi dengan rapi dan mudah dibaca.",
            ),
            Self::General => None,
        }
    }

    /// Catalog queries whose concatenated results stand in for model picks.
    /// Empty for topics without product defaults.
    pub fn default_filters(self) -> Vec<CatalogFilter> {
        match self {
            Self::Outfit => {
                let (Ok(tops), Ok(bottoms)) =
                    (case_insensitive("T-Shirt|Kaos"), case_insensitive("Celana|Pants"))
                else {
                    return Vec::new();
                };
                vec![
                    CatalogFilter::in_stock().categories(vec![tops]).limit(2),
                    CatalogFilter::in_stock().categories(vec![bottoms]).limit(2),
                ]
            }
            Self::BestSellers => vec![CatalogFilter::in_stock().best_selling().limit(4)],
            Self::Shipping | Self::General => Vec::new(),
        }
    }

    /// Reply text when the model call failed.
    pub fn failure_text(self) -> &'static str {
        match self {
            Self::Shipping => SHIPPING_INFO,
            _ => APOLOGY,
        }
    }

    /// Reason shown for a default product when the model gave none.
    pub fn auto_reason(self, product: &CatalogProduct) -> &'static str {
        let category = product.category.to_lowercase();
        match self {
            Self::Outfit if category.contains("t-shirt") => {
                "T-shirt ini sangat cocok untuk gaya casual weekend dengan desain yang stylish dan nyaman dipakai."
            }
            Self::Outfit if category.contains("celana") => {
                "Celana ini memberikan kenyamanan maksimal untuk aktivitas casual weekend dengan potongan yang pas."
            }
            Self::Outfit => "Produk ini sangat cocok untuk melengkapi outfit casual weekend Anda.",
            Self::BestSellers => {
                "Produk ini menjadi favorit customer FashionHub dengan kualitas dan desain yang trendy."
            }
            Self::Shipping | Self::General => "Produk pilihan dengan kualitas terbaik dari FashionHub.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_topics() {
        assert_eq!(
            CarouselTopic::detect("Rekomendasi outfit untuk acara casual weekend"),
            CarouselTopic::Outfit
        );
        assert_eq!(
            CarouselTopic::detect("Produk fashion terlaris minggu ini"),
            CarouselTopic::BestSellers
        );
        assert_eq!(
            CarouselTopic::detect("Informasi metode pengiriman"),
            CarouselTopic::Shipping
        );
        assert_eq!(CarouselTopic::detect("Halo"), CarouselTopic::General);
    }

    #[test]
    fn test_defaults_and_failure_text() {
        assert_eq!(CarouselTopic::Outfit.default_filters().len(), 2);
        assert_eq!(CarouselTopic::BestSellers.default_filters()[0].limit, Some(4));
        assert!(CarouselTopic::Shipping.default_filters().is_empty());
        assert_eq!(CarouselTopic::Shipping.failure_text(), SHIPPING_INFO);
        assert_eq!(CarouselTopic::General.failure_text(), APOLOGY);
    }
}
