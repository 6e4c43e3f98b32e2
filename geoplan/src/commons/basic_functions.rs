/// Capitalise the first letter of every word and lower-case the rest.
///
/// A word starts after any character that is not a letter, so
/// `"MAGILLIGAN POINT"` gives `"Magilligan Point"` and `"o'neill"` gives
/// `"O'Neill"`.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Label for a distance in metres: whole kilometres as `10 km`, shorter
/// distances in metres. `compact` drops the space (`5km`).
pub fn format_distance(metres: f64, compact: bool) -> String {
    let sep = if compact { "" } else { " " };
    if metres >= 1000.0 {
        let km = metres / 1000.0;
        if (km - km.round()).abs() < 1e-9 {
            format!("{}{}km", km.round() as i64, sep)
        } else {
            format!("{:.1}{}km", km, sep)
        }
    } else {
        format!("{}{}m", metres.round() as i64, sep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("BALLYKELLY"), "Ballykelly");
        assert_eq!(title_case("MAGILLIGAN POINT"), "Magilligan Point");
        assert_eq!(title_case("o'neill"), "O'Neill");
        assert_eq!(title_case("ST. JOHN'S-WOOD 2nd"), "St. John'S-Wood 2Nd");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(5000.0, true), "5km");
        assert_eq!(format_distance(10000.0, false), "10 km");
        assert_eq!(format_distance(2500.0, false), "2.5 km");
        assert_eq!(format_distance(500.0, false), "500 m");
    }
}
