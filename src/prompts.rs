//! Prompt text sent to the model.
//!
//! Wording is free to change; the tagged-block formats documented in
//! [`CHAT_SYSTEM_PROMPT`] and the JSON shapes requested by
//! [`recommendation_prompt`] and [`suggestion_prompt`] are what the parsers
//! in [`extract`](crate::extract) and [`assistant`](crate::assistant) rely on.

use chrono::{DateTime, Local, Timelike};
use serde_json::{json, Value};

use crate::models::CatalogProduct;

pub const CHAT_SYSTEM_PROMPT: &str = r#"Kamu adalah asisten virtual dari toko fashion online bernama **FashionHub**. Tugasmu adalah memberikan pengalaman belanja yang menyenangkan, ramah, dan profesional kepada pelanggan. Fokus utama kamu adalah membantu pelanggan dalam hal fashion dan belanja online.

Panduan:
- PENTING: Hanya rekomendasikan produk yang ada di database, jangan pernah merekomendasikan produk yang tidak ada di database.
- Jika pelanggan meminta setelan, selalu berikan rekomendasi atasan (T-Shirt) dan bawahan (Pants) yang cocok sebagai satu set.
- Bantu pelanggan memilih ukuran dan gaya; tanyakan preferensi warna dan acara.
- Selalu baca deskripsi produk sebelum menjawab pertanyaan tentang bahan, fitur, atau detail lainnya.
- Gunakan bahasa yang ramah, antusias, dan profesional, dengan emoji sewajarnya. 😊
- Jika pertanyaan tidak relevan dengan fashion & belanja, tolak dengan sopan.

INSTRUKSI KHUSUS UNTUK REKOMENDASI PRODUK:
Saat user meminta rekomendasi produk, tulis kalimat pembuka lalu tambahkan blok berikut:

[PRODUCT_CARD]
{
  "products": [
    { "id": "id produk dari database jika ada", "name": "nama produk persis seperti di database" }
  ],
  "category": "kategori rekomendasi (misal: Casual T-Shirt, Formal Outfit)"
}
[/PRODUCT_CARD]

Kemudian jelaskan setiap produk dalam blok:

[PRODUCT_DETAILS]
{
  "details": [
    {
      "name": "nama produk persis seperti di atas",
      "description": "deskripsi lengkap produk",
      "reason": "alasan kenapa produk ini direkomendasikan",
      "tips": "tips untuk menggunakan/merawat produk (opsional)"
    }
  ]
}
[/PRODUCT_DETAILS]

ATURAN JUMLAH PRODUK:
- Selalu rekomendasikan 1, 2, atau 4 produk. JANGAN PERNAH merekomendasikan 3 produk.
- Untuk setelan outfit, rekomendasikan 2 produk (1 atasan + 1 bawahan) atau 4 produk.

PENTING:
1. Nama produk HARUS PERSIS sama dengan yang ada di database.
2. Tag [PRODUCT_CARD] dan [PRODUCT_DETAILS] hanya digunakan saat merekomendasikan produk.
3. Jangan gunakan kata "Bagian 1", "Bagian 2", "Rekomendasi Produk", atau "Detail Produk" dalam respons.

INSTRUKSI UNTUK PERMINTAAN DARI CAROUSEL:
Jika permintaan berasal dari carousel, berikan respons yang lengkap, informatif, dan relevan dengan topik carousel."#;

pub const GREETING_REPLY: &str =
    "Tentu, saya siap membantu 😊 Ada yang bisa saya bantu terkait fashion atau produk FashionHub?";

pub const CAROUSEL_NOTICE: &str = "Pertanyaan ini berasal dari carousel. Berikan jawaban resmi, lengkap, dan ramah seperti respons yang sudah disiapkan.";

/// Indonesian time-of-day greeting for a local hour.
pub fn greeting_for_hour(hour: u32) -> &'static str {
    match hour {
        3..=10 => "Selamat pagi",
        11..=14 => "Selamat siang",
        15..=17 => "Selamat sore",
        _ => "Selamat malam",
    }
}

/// Greeting for an optional RFC 3339 client timestamp, read in server
/// local time. Unparseable or missing timestamps use the current time.
pub fn greeting(timestamp: Option<&str>) -> &'static str {
    let hour = timestamp
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.with_timezone(&Local).hour())
        .unwrap_or_else(|| Local::now().hour());
    greeting_for_hour(hour)
}

pub fn opening_question(greeting: &str) -> String {
    format!("{}, saya ingin bertanya.", greeting)
}

/// Catalog record as shown to the chat model.
pub fn product_context(product: &CatalogProduct) -> Value {
    json!({
        "id": product.product_id,
        "name": product.name,
        "category": product.category,
        "price": product.price,
        "stock": product.stock,
        "size": product.size,
        "description": if product.description.is_empty() {
            "Tidak ada deskripsi"
        } else {
            product.description.as_str()
        },
    })
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

pub fn catalog_context(products: &[CatalogProduct], refresh: bool) -> String {
    let entries: Vec<Value> = products.iter().map(product_context).collect();
    let label = if refresh { "refresh, " } else { "" };
    format!(
        "DATABASE_PRODUK ({}{} produk):\n{}",
        label,
        entries.len(),
        pretty(&Value::Array(entries))
    )
}

pub fn product_question(product_name: &str, input: &str) -> String {
    format!("[Produk: {}] {}", product_name, input)
}

pub fn product_detail_context(product: &CatalogProduct) -> String {
    format!(
        "Informasi detail produk yang ditanyakan:\n{}",
        pretty(&product_context(product))
    )
}

pub fn relevant_products_context(products: &[CatalogProduct]) -> String {
    let entries: Vec<Value> = products.iter().map(product_context).collect();
    format!(
        "Produk yang relevan dengan pertanyaan user:\n{}",
        pretty(&Value::Array(entries))
    )
}

/// Prompt asking for `{queryAnalysis, recommendedProducts:[{id, reason}]}`.
pub fn recommendation_prompt(query: &str, products: &[CatalogProduct], sample: usize) -> String {
    let catalog: Vec<Value> = products
        .iter()
        .take(sample)
        .map(|p| {
            json!({
                "id": p.product_id,
                "name": p.name,
                "category": if p.category.is_empty() { "Uncategorized" } else { p.category.as_str() },
                "price": p.price,
                "description": p.description,
                "rating": p.rating.unwrap_or(0.0),
                "sold": p.units_sold(),
            })
        })
        .collect();

    format!(
        r#"Kamu adalah AI yang ahli dalam fashion dan memahami tren fashion Indonesia.
Seorang pengguna mencari: "{query}".

Tugas:
1. Analisis apa yang pengguna inginkan berdasarkan query tersebut.
2. Pilih 5-10 produk dari katalog yang paling cocok dengan maksud pengguna.
3. Berikan alasan kenapa produk tersebut direkomendasikan.

Katalog produk ({total} item):
{catalog}

Contoh analisis:
- "tas keren" = pengguna mencari tas dengan desain stylish, trendy, dan sesuai tren terbaru
- "celana jeans bagus" = pengguna mencari celana jeans berkualitas dengan desain menarik

Berikan respons dalam format JSON:
{{
  "queryAnalysis": "Analisis singkat tentang maksud pencarian user",
  "recommendedProducts": [
    {{ "id": "ID produk", "reason": "Alasan kenapa produk ini direkomendasikan" }}
  ]
}}"#,
        query = query,
        total = products.len(),
        catalog = Value::Array(catalog),
    )
}

/// Prompt asking for `{suggestions, correctedQuery, relatedTerms?}`.
pub fn suggestion_prompt(
    query: &str,
    products: &[CatalogProduct],
    sample: usize,
    limit: usize,
    include_related_terms: bool,
) -> String {
    let mut categories: Vec<&str> = Vec::new();
    for p in products {
        if !p.category.is_empty() && !categories.contains(&p.category.as_str()) {
            categories.push(&p.category);
        }
    }
    let catalog: Vec<Value> = products
        .iter()
        .take(sample)
        .map(|p| json!({ "name": p.name, "category": p.category }))
        .collect();

    let related_task = if include_related_terms {
        "4. Berikan 2-3 istilah terkait untuk ekspansi kata kunci.\n"
    } else {
        ""
    };
    let related_field = if include_related_terms {
        ",\n  \"relatedTerms\": [\"term1\", \"term2\", \"term3\"]"
    } else {
        ""
    };

    format!(
        r#"Kamu adalah asisten AI untuk toko fashion online. Pengguna mengetik: "{query}"

Tugas:
1. Periksa apakah ada kemungkinan typo/kesalahan ketik.
2. Berikan {limit} saran pencarian yang relevan berdasarkan konteks fashion.
3. Jika kamu mendeteksi kesalahan ketik, berikan koreksi.
{related_task}
Informasi toko:
- Kategori produk: {categories}
- Sampel produk ({total}): {catalog}

Berikan respons dalam format JSON:
{{
  "suggestions": ["saran1", "saran2", "saran3"],
  "correctedQuery": "koreksi typo (jika tidak ada typo biarkan string kosong)"{related_field}
}}

Contoh:
- "kaos" → "Kaos Pria", "Kaos Wanita", "Kaos Oversize"
- "cealana" (typo) → koreksi "celana" dan saran "Celana Jeans", "Celana Cargo""#,
        query = query,
        limit = limit,
        related_task = related_task,
        categories = categories.join(", "),
        total = products.len(),
        catalog = Value::Array(catalog),
        related_field = related_field,
    )
}
