//! Reading and writing `.interp` files: the textual interpreter data (names plus serialized ATN)
//! that grammar tools emit alongside generated recognisers.

use std::{fs, io, path::Path, sync::Arc};

use thiserror::Error;

use crate::{
    atn::{Atn, GrammarType},
    deserialize::DeserializeError,
    grammar::GrammarInfo,
    serialize::SerializeError,
    vocabulary::Vocabulary,
};

#[derive(Debug, Error)]
pub enum InterpError {
    #[error("missing section '{0}'")]
    MissingSection(&'static str),
    #[error("line {0}: malformed ATN value '{1}'")]
    BadAtnValue(usize, String),
    #[error(transparent)]
    Deserialize(#[from] DeserializeError),
    #[error(transparent)]
    Serialize(#[from] SerializeError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

const LITERAL: &str = "token literal names:";
const SYMBOLIC: &str = "token symbolic names:";
const RULES: &str = "rule names:";
const CHANNELS: &str = "channel names:";
const MODES: &str = "mode names:";
const ATN: &str = "atn:";

fn names(v: &[String]) -> Vec<Option<String>> {
    v.iter()
        .map(|n| if n == "null" { None } else { Some(n.clone()) })
        .collect()
}

impl GrammarInfo {
    /// Parse the contents of a `.interp` file for the grammar `name`.
    pub fn from_interp(name: &str, src: &str) -> Result<GrammarInfo, InterpError> {
        let mut sections: Vec<(&str, Vec<String>)> = Vec::new();
        let mut atn_data = None;
        let mut lines = src.lines().enumerate();
        while let Some((_, line)) = lines.next() {
            let line = line.trim_end();
            if line == ATN {
                let (i, data) = lines.next().ok_or(InterpError::MissingSection("atn"))?;
                let mut vs = Vec::new();
                for v in data.trim().trim_start_matches('[').trim_end_matches(']').split(',') {
                    let v = v.trim();
                    if v.is_empty() {
                        continue;
                    }
                    vs.push(
                        v.parse::<u16>()
                            .map_err(|_| InterpError::BadAtnValue(i + 1, v.to_owned()))?,
                    );
                }
                atn_data = Some(vs);
                continue;
            }
            if let Some(h) = [LITERAL, SYMBOLIC, RULES, CHANNELS, MODES]
                .iter()
                .find(|h| **h == line)
            {
                let mut body = Vec::new();
                for (_, l) in lines.by_ref() {
                    let l = l.trim_end();
                    if l.is_empty() {
                        break;
                    }
                    body.push(l.to_owned());
                }
                sections.push((*h, body));
            }
        }
        let section = |h: &'static str| {
            sections
                .iter()
                .find(|(n, _)| *n == h)
                .map(|(_, b)| b.clone())
        };
        let literal = section(LITERAL).ok_or(InterpError::MissingSection(LITERAL))?;
        let symbolic = section(SYMBOLIC).ok_or(InterpError::MissingSection(SYMBOLIC))?;
        let rules = section(RULES).ok_or(InterpError::MissingSection(RULES))?;
        let atn = Atn::deserialize(&atn_data.ok_or(InterpError::MissingSection(ATN))?)?;
        Ok(GrammarInfo::new(
            name,
            Arc::new(atn),
            rules,
            Vocabulary::new(names(&literal), names(&symbolic)),
            section(CHANNELS).unwrap_or_default(),
            section(MODES).unwrap_or_default(),
        ))
    }

    /// Load a `.interp` file. The grammar is named after the file's stem.
    pub fn from_interp_file<P: AsRef<Path>>(path: P) -> Result<GrammarInfo, InterpError> {
        let path = path.as_ref();
        let src = fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("grammar");
        GrammarInfo::from_interp(name, &src)
    }

    /// Render this grammar in `.interp` form.
    pub fn to_interp(&self) -> Result<String, InterpError> {
        let vocab = self.vocabulary();
        let mut out = String::new();
        let n = usize::try_from(vocab.max_token_type() + 1).unwrap_or(0);
        out.push_str(LITERAL);
        out.push('\n');
        for i in 0..n {
            out.push_str(vocab.literal_name(i as i32).unwrap_or("null"));
            out.push('\n');
        }
        out.push('\n');
        out.push_str(SYMBOLIC);
        out.push('\n');
        for i in 0..n {
            let name = if i == 0 {
                None
            } else {
                vocab.symbolic_name(i as i32)
            };
            out.push_str(name.unwrap_or("null"));
            out.push('\n');
        }
        out.push('\n');
        let mut section = |h: &str, body: &[String]| {
            out.push_str(h);
            out.push('\n');
            for l in body {
                out.push_str(l);
                out.push('\n');
            }
            out.push('\n');
        };
        section(RULES, self.rule_names());
        if self.atn().grammar_type() == GrammarType::Lexer {
            section(CHANNELS, self.channel_names());
            section(MODES, self.mode_names());
        }
        let data = self
            .atn()
            .serialize()?
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>();
        out.push_str(ATN);
        out.push('\n');
        out.push('[');
        out.push_str(&data.join(", "));
        out.push(']');
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;
    use crate::{AtnBuilder, Elem, LexerAction};

    fn lexer() -> GrammarInfo {
        AtnBuilder::lexer("Calc")
            .token("NUM", Elem::range('0', '9').plus())
            .token("PLUS", Elem::lit("+"))
            .token(
                "WS",
                Elem::seq([Elem::sym(' ').plus(), Elem::Command(LexerAction::Skip)]),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_interp_round_trip() {
        let g = lexer();
        let text = g.to_interp().unwrap();
        assert!(text.starts_with("token literal names:\nnull\nnull\n'+'\nnull\n\n"));
        assert!(text.contains("rule names:\nNUM\nPLUS\nWS\n\n"));
        assert!(text.contains("mode names:\nDEFAULT_MODE\n\natn:\n[3, "));
        let g2 = GrammarInfo::from_interp("Calc", &text).unwrap();
        assert_eq!(g2.rule_names(), g.rule_names());
        assert_eq!(g2.vocabulary(), g.vocabulary());
        assert_eq!(g2.channel_names(), g.channel_names());
        assert_eq!(g2.mode_names(), g.mode_names());
        assert_eq!(g2.atn().serialize().unwrap(), g.atn().serialize().unwrap());
    }

    #[test]
    fn test_interp_file() {
        let mut f = tempfile::Builder::new().suffix(".interp").tempfile().unwrap();
        write!(f, "{}", lexer().to_interp().unwrap()).unwrap();
        let g = GrammarInfo::from_interp_file(f.path()).unwrap();
        assert_eq!(g.token_type("PLUS"), Some(2));
        assert_eq!(g.rule_idx("WS"), Some(crate::RIdx(2)));
    }

    #[test]
    fn test_missing_sections() {
        assert!(matches!(
            GrammarInfo::from_interp("X", "rule names:\ns\n\n"),
            Err(InterpError::MissingSection(LITERAL))
        ));
        assert!(matches!(
            GrammarInfo::from_interp(
                "X",
                "token literal names:\nnull\n\ntoken symbolic names:\nnull\n\nrule names:\ns\n\natn:\n[3, x]"
            ),
            Err(InterpError::BadAtnValue(11, _))
        ));
    }
}
