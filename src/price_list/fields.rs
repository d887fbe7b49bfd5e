// src/price_list/fields.rs

/// Columns we know how to fill in a [`super::PriceItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Code,
    Description,
    Unit,
    Price,
    Chapter,
}

// Vocabularies seen across price-list dialects (English exports, Italian
// regional lists, the "prodotto" XML schema). Names are compared after
// `normalize`.
const PRICE: &[&str] = &[
    "price",
    "unitprice",
    "prezzo",
    "prezzounitario",
    "prezzoeuro",
    "importo",
    "valore",
    "quotazione",
    "cost",
    "costo",
    "euro",
];
const UNIT: &[&str] = &[
    "um",
    "udm",
    "unit",
    "uom",
    "unita",
    "unitadimisura",
    "unitamisura",
    "misura",
];
const DESCRIPTION: &[&str] = &[
    "description",
    "descrizione",
    "desc",
    "estesa",
    "breve",
    "testo",
    "declaratoria",
    "title",
    "titolo",
    "name",
    "nome",
];
const CHAPTER: &[&str] = &[
    "chapter",
    "capitolo",
    "category",
    "categoria",
    "sezione",
    "gruppo",
    "section",
];
const CODE: &[&str] = &[
    "code",
    "codice",
    "cod",
    "codart",
    "articolo",
    "tariffa",
    "sku",
    "ref",
    "id",
    "prdid",
];

const ORDER: &[(Field, &[&str])] = &[
    (Field::Price, PRICE),
    (Field::Unit, UNIT),
    (Field::Description, DESCRIPTION),
    (Field::Chapter, CHAPTER),
    (Field::Code, CODE),
];

/// Lowercase ASCII alphanumerics only, namespace prefix dropped.
/// `prd:Descrizione_Estesa` → `descrizioneestesa`.
pub fn normalize(name: &str) -> String {
    let local = name.rsplit(':').next().unwrap_or(name);
    local
        .chars()
        .map(|c| match c {
            'à' | 'á' => 'a',
            'è' | 'é' => 'e',
            'ì' => 'i',
            'ò' => 'o',
            'ù' => 'u',
            other => other,
        })
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Guess which field a column/element/attribute name refers to.
///
/// Exact vocabulary hits win; otherwise a suffix match is tried for
/// vocabulary words of four letters or more (`prdDescrizione`,
/// `descrizioneEstesa`, `prezzoUnitario`).
pub fn classify(name: &str) -> Option<Field> {
    let key = normalize(name);
    if key.is_empty() {
        return None;
    }

    for (field, words) in ORDER {
        if words.contains(&key.as_str()) {
            return Some(*field);
        }
    }

    for (field, words) in ORDER {
        if words
            .iter()
            .any(|w| w.len() >= 4 && key.ends_with(w))
        {
            return Some(*field);
        }
    }

    None
}
