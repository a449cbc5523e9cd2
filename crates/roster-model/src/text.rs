use unicode_normalization::UnicodeNormalization;

/// Case-fold text for comparisons.
///
/// Vietnamese names and headers frequently arrive in decomposed form (`e` + combining hook)
/// from some spreadsheet producers, so compose to NFC before lowercasing. Lowercasing is
/// Unicode-aware (`Đ` -> `đ`).
pub fn fold(text: &str) -> String {
    if text.is_ascii() {
        return text.to_ascii_lowercase();
    }
    text.nfc().flat_map(char::to_lowercase).collect()
}
