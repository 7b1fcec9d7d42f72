//! Phonetic key functions for sounds-like term matching.
//!
//! The term dictionary's soundex/metaphone/phonix listings key the query
//! term with one of these functions and return every dictionary term
//! whose key matches.

/// Compute the four-character Soundex key of a term.
pub fn soundex(term: &str) -> String {
    let letters: Vec<char> = term
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let Some(&first) = letters.first() else {
        return String::new();
    };

    let mut key = String::new();
    key.push(first);

    let mut previous = soundex_code(first);
    for &c in &letters[1..] {
        let code = soundex_code(c);
        if code != 0 && code != previous {
            key.push(char::from_digit(code, 10).unwrap());
            if key.len() == 4 {
                break;
            }
        }
        // 'H' and 'W' do not separate duplicate codes.
        if c != 'H' && c != 'W' {
            previous = code;
        }
    }

    while key.len() < 4 {
        key.push('0');
    }
    key
}

fn soundex_code(c: char) -> u32 {
    match c {
        'B' | 'F' | 'P' | 'V' => 1,
        'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => 2,
        'D' | 'T' => 3,
        'L' => 4,
        'M' | 'N' => 5,
        'R' => 6,
        _ => 0,
    }
}

/// Compute a Metaphone-style key of a term.
pub fn metaphone(term: &str) -> String {
    let letters: Vec<char> = term
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return String::new();
    }

    let mut key = String::new();
    let mut i = 0;

    // Initial-letter exceptions.
    if letters.len() >= 2 {
        match (letters[0], letters[1]) {
            ('A', 'E') | ('G', 'N') | ('K', 'N') | ('P', 'N') | ('W', 'R') => i = 1,
            ('X', _) => {
                key.push('S');
                i = 1;
            }
            ('W', 'H') => {
                key.push('W');
                i = 2;
            }
            _ => {}
        }
    }

    while i < letters.len() && key.len() < 6 {
        let c = letters[i];
        let next = letters.get(i + 1).copied();
        let prev = if i > 0 { Some(letters[i - 1]) } else { None };

        // Collapse doubled letters other than 'C'.
        if Some(c) == prev && c != 'C' {
            i += 1;
            continue;
        }

        match c {
            'A' | 'E' | 'I' | 'O' | 'U' => {
                if i == 0 {
                    key.push(c);
                }
            }
            'B' => {
                // Silent terminal 'B' after 'M'.
                if !(i + 1 == letters.len() && prev == Some('M')) {
                    key.push('B');
                }
            }
            'C' => {
                if next == Some('H') {
                    key.push('X');
                    i += 1;
                } else if matches!(next, Some('I') | Some('E') | Some('Y')) {
                    key.push('S');
                } else {
                    key.push('K');
                }
            }
            'D' => {
                if next == Some('G') {
                    key.push('J');
                    i += 1;
                } else {
                    key.push('T');
                }
            }
            'G' => {
                if next == Some('H') {
                    key.push('K');
                    i += 1;
                } else if matches!(next, Some('I') | Some('E') | Some('Y')) {
                    key.push('J');
                } else if next == Some('N') {
                    // Silent in 'GN'.
                } else {
                    key.push('K');
                }
            }
            'H' => {
                if matches!(prev, Some('A') | Some('E') | Some('I') | Some('O') | Some('U'))
                    && !matches!(next, Some('A') | Some('E') | Some('I') | Some('O') | Some('U'))
                {
                    // Silent between a vowel and a consonant.
                } else {
                    key.push('H');
                }
            }
            'K' => {
                if prev != Some('C') {
                    key.push('K');
                }
            }
            'P' => {
                if next == Some('H') {
                    key.push('F');
                    i += 1;
                } else {
                    key.push('P');
                }
            }
            'Q' => key.push('K'),
            'S' => {
                if next == Some('H') {
                    key.push('X');
                    i += 1;
                } else {
                    key.push('S');
                }
            }
            'T' => {
                if next == Some('H') {
                    key.push('0');
                    i += 1;
                } else {
                    key.push('T');
                }
            }
            'V' => key.push('F'),
            'W' | 'Y' => {
                if matches!(next, Some('A') | Some('E') | Some('I') | Some('O') | Some('U')) {
                    key.push(c);
                }
            }
            'X' => key.push_str("KS"),
            'Z' => key.push('S'),
            _ => key.push(c),
        }
        i += 1;
    }

    key
}

/// Compute a Phonix-style key of a term: letter-group substitutions
/// followed by a Soundex-shaped numeric code retaining the first letter.
pub fn phonix(term: &str) -> String {
    let upper: String = term
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if upper.is_empty() {
        return String::new();
    }

    // A fixed subset of the Phonix group substitutions.
    const SUBSTITUTIONS: &[(&str, &str)] = &[
        ("DG", "G"),
        ("CO", "KO"),
        ("CA", "KA"),
        ("CU", "KU"),
        ("CY", "SI"),
        ("CI", "SI"),
        ("CE", "SE"),
        ("PH", "F"),
        ("GH", "G"),
        ("KN", "N"),
        ("WR", "R"),
        ("CK", "K"),
        ("SCH", "SH"),
        ("TCH", "CH"),
    ];

    let mut rewritten = upper;
    for (from, to) in SUBSTITUTIONS {
        rewritten = rewritten.replace(from, to);
    }

    let letters: Vec<char> = rewritten.chars().collect();
    let mut key = String::new();
    key.push(letters[0]);

    let mut previous = phonix_code(letters[0]);
    for &c in &letters[1..] {
        let code = phonix_code(c);
        if code != 0 && code != previous {
            key.push(char::from_digit(code, 10).unwrap());
            if key.len() == 8 {
                break;
            }
        }
        previous = code;
    }

    key
}

fn phonix_code(c: char) -> u32 {
    match c {
        'B' | 'P' => 1,
        'C' | 'G' | 'J' | 'K' | 'Q' => 2,
        'D' | 'T' => 3,
        'L' => 4,
        'M' | 'N' => 5,
        'R' => 6,
        'F' | 'V' => 7,
        'S' | 'X' | 'Z' => 8,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soundex() {
        assert_eq!(soundex("Robert"), "R163");
        assert_eq!(soundex("Rupert"), "R163");
        assert_eq!(soundex("Ashcraft"), "A261");
        assert_eq!(soundex("Tymczak"), "T522");
        assert_eq!(soundex(""), "");
    }

    #[test]
    fn test_metaphone_groups_sound_alikes() {
        assert_eq!(metaphone("Smith"), metaphone("Smyth"));
        assert_eq!(metaphone("phone"), metaphone("fone"));
        assert_ne!(metaphone("cat"), metaphone("dog"));
        assert_eq!(metaphone(""), "");
    }

    #[test]
    fn test_phonix_groups_sound_alikes() {
        assert_eq!(phonix("Knight"), phonix("Night"));
        assert_eq!(phonix("Wright"), phonix("Right"));
        assert_ne!(phonix("alpha"), phonix("omega"));
    }
}
