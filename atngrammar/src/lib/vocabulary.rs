use crate::TOKEN_EOF;

/// Maps token types to the names used when displaying tokens to humans.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Vocabulary {
    literal_names: Vec<Option<String>>,
    symbolic_names: Vec<Option<String>>,
    max_token_type: i32,
}

impl Vocabulary {
    /// Create a vocabulary from literal names (e.g. `'+'`, including the quotes) and symbolic
    /// names (e.g. `PLUS`), both indexed by token type. Index 0 is conventionally `None`.
    pub fn new(literal_names: Vec<Option<String>>, symbolic_names: Vec<Option<String>>) -> Self {
        let max_token_type = literal_names.len().max(symbolic_names.len()) as i32 - 1;
        Vocabulary {
            literal_names,
            symbolic_names,
            max_token_type,
        }
    }

    pub fn max_token_type(&self) -> i32 {
        self.max_token_type
    }

    pub fn literal_name(&self, ttype: i32) -> Option<&str> {
        usize::try_from(ttype)
            .ok()
            .and_then(|i| self.literal_names.get(i))
            .and_then(|n| n.as_deref())
    }

    pub fn symbolic_name(&self, ttype: i32) -> Option<&str> {
        if ttype == TOKEN_EOF {
            return Some("EOF");
        }
        usize::try_from(ttype)
            .ok()
            .and_then(|i| self.symbolic_names.get(i))
            .and_then(|n| n.as_deref())
    }

    /// The literal name if there is one, then the symbolic name, falling back to the numeric
    /// token type.
    pub fn display_name(&self, ttype: i32) -> String {
        self.literal_name(ttype)
            .or_else(|| self.symbolic_name(ttype))
            .map(|s| s.to_owned())
            .unwrap_or_else(|| ttype.to_string())
    }

    /// Look up a token type by its symbolic or literal name.
    pub fn token_type(&self, name: &str) -> Option<i32> {
        self.symbolic_names
            .iter()
            .position(|n| n.as_deref() == Some(name))
            .or_else(|| {
                self.literal_names
                    .iter()
                    .position(|n| n.as_deref() == Some(name))
            })
            .map(|i| i as i32)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display_names() {
        let v = Vocabulary::new(
            vec![None, Some("'+'".to_owned())],
            vec![None, Some("PLUS".to_owned()), Some("ID".to_owned())],
        );
        assert_eq!(v.max_token_type(), 2);
        assert_eq!(v.display_name(1), "'+'");
        assert_eq!(v.display_name(2), "ID");
        assert_eq!(v.display_name(7), "7");
        assert_eq!(v.display_name(TOKEN_EOF), "EOF");
        assert_eq!(v.token_type("ID"), Some(2));
        assert_eq!(v.token_type("'+'"), Some(1));
    }
}
