//! Expanding `!input` directives.
//!
//! The only preprocessor directive is `!input '<dotted.path>';`, which splices
//! the (recursively preprocessed) text of another file into the source.
//! The spliced text is wrapped in marker comments naming the file it came from:
//!
//! ```text
//! #<<File = /home/user/lib/math.mima>>#
//! ...contents of lib/math.mima...
//! #<<File>>#
//! ```
//!
//! A dotted path `a.b` is looked up for every known file extension, trying in order:
//! 1. `<working dir>/a/b.<ext>` (skipped for files which were themselves found in the home directory),
//! 2. `<home dir>/a/b.<ext>`,
//! 3. `a.b` as written.
//!
//! Every file is only spliced once per expansion. Files are compared by the path
//! they were found at, so the same file reached through two different spellings
//! of its path is spliced twice. Nesting is capped at [`MAX_INPUT_DEPTH`] files.
//!
//! Failures never stop preprocessing: the directive is dropped and an error is recorded.

use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::err::Position;
use crate::sim::instr::InstructionSet;

use super::lex::{self, Ident, TokenStream};
use super::{ParseErr, ParseErrKind};

/// The maximum number of nested `!input` directives.
pub const MAX_INPUT_DEPTH: usize = 64;

/// Where and how `!input` directives are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessOptions {
    /// The directory relative paths are first resolved against.
    pub working_dir: PathBuf,
    /// The directory relative paths are resolved against when not found in the working directory.
    pub home_dir: PathBuf,
    /// Whether directives are expanded.
    ///
    /// If false, directives are still validated and removed, but no files are read.
    pub recursive: bool
}
impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            home_dir: default_home_dir(),
            recursive: true
        }
    }
}

/// The default home directory (`$HOME/.mima`).
pub fn default_home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".mima")
}

/// Expands all `!input` directives in the source.
///
/// `source_path` is the file the source was read from (if any),
/// which prevents the file from including itself.
///
/// This returns the expanded text and every error which occurred during expansion.
///
/// ```
/// use mima::parse::preprocess::{preprocess, PreprocessOptions};
///
/// let (text, errors) = preprocess("LDC(1); !input 'does.not.exist'; HALT();", None, &PreprocessOptions::default());
/// assert_eq!(text, "LDC(1);  HALT();");
/// assert_eq!(errors.len(), 1);
/// ```
pub fn preprocess(src: &str, source_path: Option<&Path>, opts: &PreprocessOptions) -> (String, Vec<ParseErr>) {
    let mut processed = HashSet::new();
    if let Some(path) = source_path {
        processed.insert(path.to_path_buf());
    }

    let mut pp = Preprocessor { opts, processed, in_home: false, depth: 0 };
    pp.process(src)
}

struct Preprocessor<'o> {
    opts: &'o PreprocessOptions,
    processed: HashSet<PathBuf>,
    in_home: bool,
    depth: usize
}
impl Preprocessor<'_> {
    fn process(&mut self, src: &str) -> (String, Vec<ParseErr>) {
        let mut stream = TokenStream::new(src);
        let mut errors = vec![];
        let mut edits: Vec<(Range<usize>, String)> = vec![];

        while let Some(lexeme) = stream.next() {
            if lexeme.token != Ok(lex::Token::Punct('!')) {
                continue;
            }

            let start = lexeme.span.start;
            match read_directive(src, &mut stream) {
                Ok(path) => {
                    let text = match self.opts.recursive {
                        true  => self.include(&path, lexeme.pos, &mut errors),
                        false => String::new(),
                    };
                    edits.push((start..stream.consumed_offset(), text));
                },
                Err(e) if e.kind == ParseErrKind::ExpectedPunct(';') => {
                    errors.push(e);
                    edits.push((start..stream.position().offset, String::new()));
                },
                Err(e) => {
                    errors.push(e);
                    skip_directive(&mut stream, lexeme.pos.line);
                    edits.push((start..stream.consumed_offset(), String::new()));
                }
            }
        }

        // edits are in ascending order, so applying them back to front keeps earlier offsets valid
        let mut out = src.to_string();
        for (range, text) in edits.into_iter().rev() {
            out.replace_range(range, &text);
        }
        (out, errors)
    }

    /// Finds, reads and expands the file at a dotted path,
    /// returning the text to splice in place of the directive.
    fn include(&mut self, raw: &str, pos: Position, errors: &mut Vec<ParseErr>) -> String {
        if self.depth >= MAX_INPUT_DEPTH {
            errors.push(ParseErr::new(ParseErrKind::IncludeTooDeep(raw.to_string()), pos));
            return String::new();
        }

        let stripped: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let relative: PathBuf = stripped.split('.').collect();

        let mut already_included = false;
        for ext in InstructionSet::extensions() {
            let mut candidates = vec![];
            if !self.in_home {
                candidates.push((self.opts.working_dir.join(&relative).with_extension(ext), false));
            }
            candidates.push((self.opts.home_dir.join(&relative).with_extension(ext), true));
            candidates.push((PathBuf::from(raw), self.in_home));

            for (path, in_home) in candidates {
                if self.processed.contains(&path) {
                    already_included = true;
                    continue;
                }
                let Ok(text) = std::fs::read_to_string(&path) else {
                    log::trace!("no input file at {}", path.display());
                    continue;
                };

                log::debug!("including {}", path.display());
                self.processed.insert(path.clone());

                let saved = std::mem::replace(&mut self.in_home, in_home);
                self.depth += 1;
                let (body, nested) = self.process(&text);
                self.depth -= 1;
                self.in_home = saved;

                if !nested.is_empty() {
                    errors.push(ParseErr::new(ParseErrKind::IncludedFileErrors(path.display().to_string()), pos));
                    errors.extend(nested.into_iter().map(|e| e.in_file(&path)));
                }
                return format!("\n#<<File = {}>>#\n{body}\n#<<File>>#\n", path.display());
            }
        }

        let kind = match already_included {
            true  => ParseErrKind::AlreadyIncluded(raw.to_string()),
            false => ParseErrKind::FileNotFound(raw.to_string()),
        };
        errors.push(ParseErr::new(kind, pos));
        String::new()
    }
}

/// Reads the rest of a directive (after the `!`), returning its path.
fn read_directive(src: &str, stream: &mut TokenStream) -> Result<String, ParseErr> {
    if !stream.is_keyword(&Ident::Input) {
        let found = stream.peek()
            .map(|l| src[l.span.clone()].to_string())
            .unwrap_or_default();
        return Err(ParseErr::new(ParseErrKind::UnknownDirective(found), stream.position()));
    }
    stream.next();

    let path = match stream.peek_token() {
        Some(lex::Token::String(path)) => path.clone(),
        _ => return Err(ParseErr::new(ParseErrKind::ExpectedInputPath, stream.position())),
    };
    stream.next();

    if !stream.is_punct(';') {
        return Err(ParseErr::new(ParseErrKind::ExpectedPunct(';'), stream.position()));
    }
    stream.next();

    Ok(path)
}

/// Skips the rest of a malformed directive,
/// up to and including the next `;` on the directive's line.
fn skip_directive(stream: &mut TokenStream, line: usize) {
    while let Some(l) = stream.peek() {
        if l.pos.line != line || l.token == Ok(lex::Token::Punct('!')) {
            break;
        }
        let terminated = l.token == Ok(lex::Token::Punct(';'));
        stream.next();
        if terminated {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use crate::parse::{parse_program, ParseErrKind};

    use super::{preprocess, PreprocessOptions, MAX_INPUT_DEPTH};

    fn options(dir: &Path) -> PreprocessOptions {
        PreprocessOptions {
            working_dir: dir.to_path_buf(),
            home_dir: dir.join("home"),
            recursive: true
        }
    }

    fn write(path: &Path, text: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }

    #[test]
    fn test_splice_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let included = dir.path().join("a").join("b.mima");
        write(&included, "NOT();");

        let src = "LDC(5);\n!input 'a.b';\nHALT();";
        let (text, errors) = preprocess(src, None, &options(dir.path()));
        assert!(errors.is_empty(), "{errors:?}");

        let open = format!("#<<File = {}>>#", included.display());
        let expected = format!("LDC(5);\n\n{open}\nNOT();\n#<<File>>#\n\nHALT();");
        assert_eq!(text, expected);
        assert!(!text.contains("!input"));

        let (program, errors) = parse_program(&text);
        assert!(errors.is_empty(), "{errors:?}");
        let names: Vec<_> = program.statements().iter().filter_map(|t| t.name()).collect();
        assert_eq!(names, ["LDC", "NOT", "HALT"]);
    }

    #[test]
    fn test_home_dir_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path());
        write(&opts.home_dir.join("lib").join("stack.mimax"), "!input 'util';\nSP();");
        write(&opts.home_dir.join("util.mima"), "NOT();");
        // not visible from the home directory
        write(&dir.path().join("util.mimax"), "RAR();");

        let (text, errors) = preprocess("!input ' lib . stack ';", None, &opts);
        assert!(errors.is_empty(), "{errors:?}");
        assert!(text.contains("SP();"));
        assert!(text.contains("NOT();"));
        assert!(!text.contains("RAR();"));
        assert_eq!(text.matches("#<<File>>#").count(), 2);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let (text, errors) = preprocess("A();\n!input 'nope';\nB();", None, &options(dir.path()));

        assert_eq!(text, "A();\n\nB();");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ParseErrKind::FileNotFound("nope".to_string()));
        assert_eq!((errors[0].line(), errors[0].column()), (1, 0));
    }

    #[test]
    fn test_included_once() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("x.mima"), "NOT();");

        let (text, errors) = preprocess("!input 'x'; !input 'x';", None, &options(dir.path()));
        assert_eq!(text.matches("NOT();").count(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ParseErrKind::AlreadyIncluded("x".to_string()));

        // a file cannot include itself
        let root = dir.path().join("self.mima");
        let src = "!input 'self';";
        write(&root, src);
        let (_, errors) = preprocess(src, Some(&root), &options(dir.path()));
        assert_eq!(errors[0].kind, ParseErrKind::AlreadyIncluded("self".to_string()));
    }

    #[test]
    fn test_directive_errors() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path());

        let (text, errors) = preprocess("!foo; A();", None, &opts);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ParseErrKind::UnknownDirective("foo".to_string()));
        assert_eq!(text, " A();");

        let (text, errors) = preprocess("!input x;
A();", None, &opts);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ParseErrKind::ExpectedInputPath);
        assert_eq!(text, "\nA();");

        // without a `;`, the directive ends with its line
        let (text, _) = preprocess("!foo bar\nA();", None, &opts);
        assert_eq!(text, "\nA();");

        let (text, errors) = preprocess("!input 'x' A();", None, &opts);
        assert_eq!(errors[0].kind, ParseErrKind::ExpectedPunct(';'));
        assert_eq!(text, "A();");
    }

    #[test]
    fn test_nested_errors_name_file() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("inner.mima");
        write(&inner, "NOT();\n!input 'missing';");

        let (text, errors) = preprocess("!input 'inner';", None, &options(dir.path()));
        assert!(text.contains("NOT();"));
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0].kind, ParseErrKind::IncludedFileErrors(_)));
        assert_eq!(errors[0].file, None);
        assert_eq!(errors[1].kind, ParseErrKind::FileNotFound("missing".to_string()));
        assert_eq!(errors[1].file.as_deref(), Some(inner.as_path()));
        assert_eq!(errors[1].line(), 1);
    }

    #[test]
    fn test_depth_limit() {
        let dir = tempfile::tempdir().unwrap();
        let chain = MAX_INPUT_DEPTH + 2;
        for i in 0..chain {
            write(&dir.path().join(format!("f{i}.mima")), &format!("!input 'f{}';", i + 1));
        }

        let (_, errors) = preprocess("!input 'f0';", None, &options(dir.path()));
        let too_deep = errors.iter()
            .filter(|e| matches!(e.kind, ParseErrKind::IncludeTooDeep(_)))
            .count();
        assert_eq!(too_deep, 1);
    }

    #[test]
    fn test_not_recursive() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("x.mima"), "NOT();");
        let opts = PreprocessOptions { recursive: false, ..options(dir.path()) };

        let (text, errors) = preprocess("A(); !input 'x';", None, &opts);
        assert!(errors.is_empty());
        assert_eq!(text, "A(); ");
    }
}
