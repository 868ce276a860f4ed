//! The compilation pipeline.
//!
//! Multiple input files share one struct/typedef/global namespace and
//! compile into a single output image, in argument order.

use xcc_backend::{emit_program, Image, Target};
use xcc_common::{CompileResult, SourceMap};
use xcc_ir::lower_program;
use xcc_lexer::Lexer;
use xcc_parser::{Declaration, GlobalTable, ParseContext, Parser, Program};
use xcc_sema::analyze_program;

/// Incremental front end: feed sources in, then `finish` into an image.
#[derive(Default)]
pub struct Compiler {
    sources: SourceMap,
    ctx: ParseContext,
    decls: Vec<Declaration>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source registry for diagnostic rendering.
    pub fn sources(&self) -> &SourceMap {
        &self.sources
    }

    /// Lex and parse one source file into the shared namespace.
    pub fn add_source(&mut self, name: &str, text: &str) -> CompileResult<()> {
        let file_id = self.sources.add(name, text);
        log::info!("compiling {}", name);
        let tokens = Lexer::new(text, file_id).tokenize()?;
        let decls = Parser::new(tokens, &mut self.ctx).parse_program()?;
        self.decls.extend(decls);
        Ok(())
    }

    /// Analyse, lower and emit everything parsed so far. The source
    /// registry stays behind so a failure can still be rendered.
    pub fn finish(&mut self, target: Target) -> CompileResult<Image> {
        let mut program = Program {
            decls: std::mem::take(&mut self.decls),
            structs: std::mem::take(&mut self.ctx.structs),
            globals: GlobalTable::new(),
        };
        analyze_program(&mut program)?;
        let module = lower_program(&program)?;
        emit_program(&program, &module, target)
    }
}

/// One-shot convenience used by tests: compile named sources to an image.
pub fn compile_sources(sources: &[(&str, &str)], target: Target) -> CompileResult<Image> {
    let mut compiler = Compiler::new();
    for (name, text) in sources {
        compiler.add_source(name, text)?;
    }
    compiler.finish(target)
}
