use std::{
    env, fs,
    io::{stderr, stdout, Write},
    path::Path,
    process,
};

use atngrammar::{GrammarInfo, RIdx};
use getopts::Options;
use lllex::{InputStream, LexerDef};
use llpar::{
    CollectingErrorListener, DiagnosticErrorListener, ListTokenSource, ParserDef, PredictionMode,
    RecoveryKind,
};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod diagnostics;
use diagnostics::SyntaxErrorFormatter;

fn usage(prog: &str, msg: &str) -> ! {
    let path = Path::new(prog);
    let leaf = path
        .file_name()
        .and_then(|m| m.to_str())
        .unwrap_or("llinterp");
    if !msg.is_empty() {
        writeln!(&mut stderr(), "{}", msg).ok();
    }
    writeln!(
        &mut stderr(),
        "Usage: {} [-d] [-m <sll|ll|exact>] [-q] [-r <default|bail>] [-s <rule>] [-t] <lexer.interp> [<parser.interp>] <input file>",
        leaf
    )
    .ok();
    process::exit(1);
}

struct Config {
    lexer_path: String,
    parser_path: Option<String>,
    input_path: String,
    start_rule: Option<String>,
    recoverer: RecoveryKind,
    mode: PredictionMode,
    diagnostics: bool,
    print_tokens: bool,
    quiet: bool,
}

fn load_grammar(path: &str) -> Result<GrammarInfo, String> {
    GrammarInfo::from_interp_file(path).map_err(|e| format!("{}: {}", path, e))
}

/// Lex, and if a parser was given parse, the input described by `cfg`, writing tokens, the
/// parse tree, and errors to `out`. Returns `true` if any syntax errors were found.
fn run<W: Write>(cfg: &Config, out: &mut W) -> Result<bool, String> {
    let lexdef = LexerDef::new(load_grammar(&cfg.lexer_path)?)
        .map_err(|e| format!("{}: {}", cfg.lexer_path, e))?;
    let input = fs::read_to_string(&cfg.input_path)
        .map_err(|e| format!("Can't open file {}: {}", cfg.input_path, e))?;
    let werr = |e: std::io::Error| e.to_string();

    let lex_errs = CollectingErrorListener::new();
    let mut lexer = lexdef.lexer_for(InputStream::new(&input).with_name(&cfg.input_path));
    lexer.remove_error_listeners();
    lexer.add_error_listener(Box::new(lex_errs.clone()));
    let tokens = lexer.all_tokens();
    debug!(tokens = tokens.len(), "lexed input");
    if cfg.print_tokens {
        let vocab = lexdef.grammar().vocabulary();
        for t in &tokens {
            writeln!(out, "{} {}", t, vocab.display_name(t.ttype())).map_err(werr)?;
        }
    }
    let mut errors = lex_errs.errors();

    if let Some(parser_path) = &cfg.parser_path {
        let pdef = ParserDef::new(load_grammar(parser_path)?)
            .map_err(|e| format!("{}: {}", parser_path, e))?
            .recoverer(cfg.recoverer)
            .prediction_mode(cfg.mode)
            .build_parse_trees(!cfg.quiet);
        let rule = match &cfg.start_rule {
            Some(n) => pdef
                .rule_idx(n)
                .ok_or_else(|| format!("{}: unknown rule '{}'", parser_path, n))?,
            None => RIdx(0),
        };
        let parse_errs = CollectingErrorListener::new();
        let diag = DiagnosticErrorListener::new(cfg.mode == PredictionMode::LlExactAmbigDetection);
        let mut parser =
            pdef.parser(ListTokenSource::new(tokens).with_name(&cfg.input_path));
        parser.core_mut().remove_error_listeners();
        parser
            .core_mut()
            .add_error_listener(Box::new(parse_errs.clone()));
        if cfg.diagnostics {
            parser.core_mut().add_error_listener(Box::new(diag.clone()));
        }
        match parser.parse(rule) {
            Ok(tree) => {
                if !cfg.quiet {
                    writeln!(out, "{}", tree.to_string_tree(pdef.grammar().rule_names()))
                        .map_err(werr)?;
                }
            }
            Err(e) => writeln!(out, "Unable to parse input: {}", e.error).map_err(werr)?,
        }
        errors.extend(parse_errs.errors());
        for r in diag.reports() {
            writeln!(out, "{}", r).map_err(werr)?;
        }
    }

    let fmt = SyntaxErrorFormatter::new(&input, Path::new(&cfg.input_path));
    for e in &errors {
        writeln!(out, "{}", fmt.format(e)).map_err(werr)?;
    }
    Ok(!errors.is_empty())
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let prog = &args[0];
    let matches = match Options::new()
        .optflag("h", "help", "")
        .optflag(
            "d",
            "diagnostics",
            "Report ambiguities and decisions which needed full context",
        )
        .optopt(
            "m",
            "mode",
            "Prediction mode to be used (default: ll)",
            "sll|ll|exact",
        )
        .optflag("q", "quiet", "Don't print the parse tree")
        .optopt(
            "r",
            "recoverer",
            "Recoverer to be used (default: default)",
            "default|bail",
        )
        .optopt("s", "start", "Rule to start parsing from (default: the first rule)", "RULE")
        .optflag("t", "tokens", "Print the tokens the lexer produces")
        .parse(&args[1..])
    {
        Ok(m) => m,
        Err(f) => usage(prog, f.to_string().as_str()),
    };

    if matches.opt_present("h") {
        usage(prog, "");
    }

    let recoverer = match matches.opt_str("r") {
        None => RecoveryKind::Default,
        Some(s) => match &*s.to_lowercase() {
            "default" => RecoveryKind::Default,
            "bail" => RecoveryKind::Bail,
            _ => usage(prog, &format!("Unknown recoverer '{}'.", s)),
        },
    };

    let mode = match matches.opt_str("m") {
        None => PredictionMode::Ll,
        Some(s) => match &*s.to_lowercase() {
            "sll" => PredictionMode::Sll,
            "ll" => PredictionMode::Ll,
            "exact" => PredictionMode::LlExactAmbigDetection,
            _ => usage(prog, &format!("Unknown prediction mode '{}'.", s)),
        },
    };

    let (lexer_path, parser_path, input_path) = match matches.free.len() {
        2 => (matches.free[0].clone(), None, matches.free[1].clone()),
        3 => (
            matches.free[0].clone(),
            Some(matches.free[1].clone()),
            matches.free[2].clone(),
        ),
        _ => usage(prog, "Wrong number of arguments given."),
    };

    let cfg = Config {
        lexer_path,
        parser_path,
        input_path,
        start_rule: matches.opt_str("s"),
        recoverer,
        mode,
        diagnostics: matches.opt_present("d"),
        print_tokens: matches.opt_present("t"),
        quiet: matches.opt_present("q"),
    };
    match run(&cfg, &mut stdout()) {
        Ok(false) => (),
        Ok(true) => process::exit(1),
        Err(e) => {
            writeln!(&mut stderr(), "{}", e).ok();
            process::exit(1);
        }
    }
}
