//! Starter catalog loaded by `flowershop seed` (or `serve --seed`).

use model::NewProduct;

const PHOTO_BASE: &str = "https://images.unsplash.com";

// (name, category, description, price, photo, popular, express)
const CATALOG: &[(&str, &str, &str, i64, &str, bool, bool)] = &[
    ("Classic roses", "roses", "Red roses in a gift wrap.", 800_000, "photo-1518895949257-7621c3c786d7", true, true),
    ("Premium roses", "roses", "Long-stem roses of the highest grade.", 1_500_000, "photo-1520763185298-1b434c919102", true, false),
    ("White roses", "roses", "Elegant white roses.", 900_000, "photo-1574684891179-5d6c069ac4e0", false, false),
    ("Tropical paradise", "exotic", "Bright tropical flowers.", 1_200_000, "photo-1563241527-3004b7be0ffd", true, false),
    ("Phalaenopsis orchid", "exotic", "Potted orchid that lasts for weeks.", 1_800_000, "photo-1518709268805-4e9042af2176", true, false),
    ("Red anthurium", "exotic", "Potted anthurium.", 1_400_000, "photo-1578662996442-48f60103fc96", false, false),
    ("Spring mix", "mix", "Seasonal flowers in soft colours.", 900_000, "photo-1490750967868-88aa4486c946", true, true),
    ("Romantic mix", "mix", "Pink and white flowers.", 1_100_000, "photo-1513475382585-d06e58bcb0e0", true, false),
    ("Bright mix", "mix", "Multicoloured bouquet.", 950_000, "photo-1578662996442-48f60103fc96", false, false),
    ("White lilies", "mono", "A bouquet of white lilies.", 700_000, "photo-1574684891179-5d6c069ac4e0", false, false),
    ("Yellow tulips", "mono", "Yellow tulips.", 600_000, "photo-1520763185298-1b434c919102", true, true),
    ("Purple irises", "mono", "Purple irises.", 750_000, "photo-1518709268805-4e9042af2176", false, false),
    ("Sunflowers", "mono", "A bunch of sunflowers.", 550_000, "photo-1490750967868-88aa4486c946", false, false),
];

pub fn products() -> Vec<NewProduct> {
    CATALOG
        .iter()
        .map(
            |&(name, category, description, price, photo, is_popular, is_express)| NewProduct {
                name: name.to_string(),
                category: Some(category.to_string()),
                description: Some(description.to_string()),
                price,
                photo_url: Some(format!("{PHOTO_BASE}/{photo}?w=400")),
                is_popular,
                is_express,
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_well_formed() {
        let products = products();
        assert_eq!(products.len(), CATALOG.len());
        assert!(products.iter().all(|p| p.price > 0));
        assert!(products.iter().any(|p| p.is_popular));
        assert!(
            products
                .iter()
                .all(|p| p.photo_url.as_deref().is_some_and(|u| u.starts_with("https://")))
        );
    }
}
