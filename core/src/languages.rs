//! Static per-language compile/execute command table.
//!
//! Paths in the argv templates are resolved inside the sandbox, relative to
//! the box root, so `code/main.c` here is `<boxroot>/code/main.c` on disk.

/// Commands and file layout for one supported language.
#[derive(Debug, Clone, Copy)]
pub struct LanguageSpec {
    /// Language tag as sent by the client (e.g. "cpp").
    pub tag: &'static str,
    /// Where the submitted source is written, relative to the box root.
    pub source_filename: &'static str,
    /// Compile argv. Empty for interpreted languages.
    pub compile: &'static [&'static str],
    /// Execute argv. Never empty.
    pub execute: &'static [&'static str],
}

impl LanguageSpec {
    pub fn needs_compile(&self) -> bool {
        !self.compile.is_empty()
    }
}

const LANGUAGES: &[LanguageSpec] = &[
    LanguageSpec {
        tag: "c",
        source_filename: "code/main.c",
        compile: &["/usr/bin/gcc", "code/main.c", "-o", "code/main", "-O2", "-w", "-lm"],
        execute: &["code/main"],
    },
    LanguageSpec {
        tag: "cpp",
        source_filename: "code/main.cpp",
        compile: &[
            "/usr/bin/g++",
            "code/main.cpp",
            "-o",
            "code/main",
            "-O2",
            "-w",
        ],
        execute: &["code/main"],
    },
    LanguageSpec {
        tag: "python",
        source_filename: "code/main.py",
        compile: &[],
        execute: &["/usr/bin/python3", "code/main.py"],
    },
    LanguageSpec {
        tag: "java",
        source_filename: "code/Main.java",
        compile: &["/usr/bin/javac", "code/Main.java"],
        execute: &["/usr/bin/java", "-cp", "code", "Main"],
    },
    LanguageSpec {
        tag: "javascript",
        source_filename: "code/main.js",
        compile: &[],
        execute: &["/usr/bin/node", "code/main.js"],
    },
];

/// Look up a language by its client-facing tag.
pub fn find(tag: &str) -> Option<&'static LanguageSpec> {
    LANGUAGES.iter().find(|spec| spec.tag == tag)
}

pub fn supported_tags() -> impl Iterator<Item = &'static str> {
    LANGUAGES.iter().map(|spec| spec.tag)
}
