//! Voice-friendly narration of search results.
//!
//! The assistant reads one sentence per search. Only the first result is
//! announced; the rest travel in the JSON payload for the host UI.

use super::types::BusinessHit;

/// Narrate a result set for the given query.
pub fn voice_response(results: &[BusinessHit], query: &str) -> String {
    if results.is_empty() {
        return format!(
            "I couldn't find any results for {query} in Sacramento County. \
             Could you try a different search term?"
        );
    }

    let count = results.len();
    let plural = if count == 1 { "" } else { "s" };
    let mut response = format!("I found {count} option{plural} for {query}. ");

    let first = &results[0];
    response.push_str(&first.name);

    if !first.description.is_empty() {
        response.push_str(", ");
        response.push_str(&first.description);
    }

    if !first.address.is_empty() {
        let street = street_address(&first.address);
        if !street.is_empty() {
            response.push_str(", located at ");
            response.push_str(street);
        }
    }

    response.push('.');
    response
}

/// Apology narration when the pipeline fails.
pub fn error_response(query: &str) -> String {
    format!("I'm sorry, I encountered an error while searching for {query}. Please try again.")
}

/// House number and street only: everything before the first comma.
fn street_address(address: &str) -> &str {
    address.split(',').next().unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(name: &str, description: &str, address: &str) -> BusinessHit {
        BusinessHit {
            id: "1".to_string(),
            name: name.to_string(),
            description: description.to_string(),
            address: address.to_string(),
            city: "Sacramento".to_string(),
            latitude: 38.58,
            longitude: -121.49,
            phone: None,
            website: None,
            source: "supabase".to_string(),
            similarity: None,
        }
    }

    #[test]
    fn test_no_results_narration() {
        assert_eq!(
            voice_response(&[], "sushi"),
            "I couldn't find any results for sushi in Sacramento County. \
             Could you try a different search term?"
        );
    }

    #[test]
    fn test_single_result_has_no_plural() {
        let results = vec![hit("Kru", "", "")];
        assert_eq!(voice_response(&results, "sushi"), "I found 1 option for sushi. Kru.");
    }

    #[test]
    fn test_multiple_results_announce_first_only() {
        let results = vec![
            hit("Kru", "japanese restaurant", "3135 Folsom Blvd, Sacramento, CA 95816"),
            hit("Mikuni", "", ""),
            hit("Zen Sushi", "", ""),
        ];
        assert_eq!(
            voice_response(&results, "sushi"),
            "I found 3 options for sushi. Kru, japanese restaurant, located at 3135 Folsom Blvd."
        );
    }

    #[test]
    fn test_description_omitted_when_empty() {
        let results = vec![hit("Kru", "", "3135 Folsom Blvd, Sacramento, CA 95816")];
        assert_eq!(
            voice_response(&results, "sushi"),
            "I found 1 option for sushi. Kru, located at 3135 Folsom Blvd."
        );
    }

    #[test]
    fn test_address_omitted_when_empty() {
        let results = vec![hit("Kru", "japanese restaurant", "")];
        assert_eq!(
            voice_response(&results, "sushi"),
            "I found 1 option for sushi. Kru, japanese restaurant."
        );
    }

    #[test]
    fn test_street_address_takes_first_comma_part() {
        assert_eq!(street_address("3135 Folsom Blvd, Sacramento, CA"), "3135 Folsom Blvd");
        assert_eq!(street_address("No commas here"), "No commas here");
    }

    #[test]
    fn test_error_response_wording() {
        assert_eq!(
            error_response("tacos"),
            "I'm sorry, I encountered an error while searching for tacos. Please try again."
        );
    }
}
