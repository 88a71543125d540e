//! Mirra CLI - コマンドラインインターフェース
//!
//! 停止中のターゲットに対して式を評価する mirra のREPLインターフェース

use anyhow::Result;
use clap::{Parser, Subcommand};
use mirra_async::{AsyncEvaluation, EvaluationResult};
use mirra_core::{
    engine, Command, DisplayFormat, DisplayList, EvalError, EvaluationContext, EvaluationFlags,
    FormatOptions, InterruptToken,
};
use mirra_target::sim::demo::{self, DEMO_THREAD};
use mirra_target::sim::SimTarget;
use mirra_target::Target;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Mirra - Expression Evaluator for Stopped Processes
#[derive(Parser)]
#[command(name = "mirra")]
#[command(version = "0.1.0")]
#[command(about = "Evaluate C#-like expressions against a stopped target", long_about = None)]
struct Cli {
    /// Line width used when formatting values
    #[arg(long, default_value_t = 80)]
    width: usize,

    /// Allow breakpoints hit during target invocations to stop the target
    #[arg(long)]
    nested_break_states: bool,

    /// Refuse to invoke methods or property getters in the target
    #[arg(long)]
    no_invoke: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Start a REPL over the built-in demo target
    Demo,

    /// Evaluate expressions against the demo target and exit
    Eval {
        /// Expressions to evaluate
        #[arg(required = true)]
        exprs: Vec<String>,
    },
}

/// REPLセッションの状態
struct Session {
    target: Arc<SimTarget>,
    runtime: Runtime,
    flags: EvaluationFlags,
    options: FormatOptions,
    /// Ctrl-C で割り込まれるセッション全体のトークン
    interrupt: InterruptToken,
    displays: DisplayList,
}

impl Session {
    fn new(cli: &Cli) -> Result<Self> {
        let target = demo::build()?;
        let flags = EvaluationFlags {
            nested_break_states: cli.nested_break_states,
            allow_invocations: !cli.no_invoke,
        };
        let options = FormatOptions {
            width: cli.width,
            ..FormatOptions::default()
        };
        Ok(Self {
            target,
            runtime: Runtime::new()?,
            flags,
            options,
            interrupt: InterruptToken::new(),
            displays: DisplayList::new(),
        })
    }

    /// 現在の停止状態に対する新しい評価コンテキスト
    fn context(&self) -> EvaluationContext {
        let mut ctx = EvaluationContext::for_thread(self.target.clone(), DEMO_THREAD);
        ctx.set_flags(self.flags);
        ctx.set_interrupt(self.interrupt.clone());
        ctx
    }

    fn options(&self, format: DisplayFormat) -> FormatOptions {
        self.options.with_format(format)
    }

    /// ワーカー上で評価し、完了か Ctrl-C まで待つ
    fn evaluate(&self, text: &str, format: DisplayFormat) -> Result<()> {
        let handle = match engine::parse(text) {
            Ok(handle) => handle,
            Err(e) => return report(e),
        };
        // 前のコマンドでの割り込みを持ち越さない
        self.interrupt.reset();
        let eval = AsyncEvaluation::spawn(self.context(), handle, self.options(format))?;
        let result = self
            .runtime
            .block_on(eval.wait_interruptible(&self.interrupt));
        self.interrupt.reset();
        print_result(&result);
        Ok(())
    }

    fn show_displays(&self) {
        let ctx = self.context();
        for line in self.displays.show_all(&ctx, &self.options) {
            println!("{}", line);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut session = Session::new(&cli)?;

    let interrupt = session.interrupt.clone();
    ctrlc::set_handler(move || interrupt.interrupt())?;

    match cli.command {
        Some(Mode::Eval { ref exprs }) => {
            for expr in exprs {
                session.evaluate(expr, DisplayFormat::Default)?;
            }
        }
        Some(Mode::Demo) | None => {
            println!("Mirra - Expression Evaluator");
            println!("Version 0.1.0");
            println!();
            println!(
                "Attached to demo process {} (stopped in {})",
                session.target.process_id(),
                current_method(&session)
            );
            run_repl(&mut session)?;
        }
    }

    Ok(())
}

/// `RUST_LOG` が無ければ warn、`--verbose` なら debug
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn history_path() -> Option<PathBuf> {
    home::home_dir().map(|dir| dir.join(".mirra_history"))
}

fn current_method(session: &Session) -> String {
    session
        .context()
        .current_frame()
        .map(|frame| frame.method.clone())
        .unwrap_or_else(|| "<no frame>".to_string())
}

/// REPLループを実行する
fn run_repl(session: &mut Session) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;
    let history = history_path();
    if let Some(path) = &history {
        if rl.load_history(path).is_err() {
            debug!("no history at {}", path.display());
        }
    }

    loop {
        let readline = rl.readline("(mirra) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match handle_command(session, line) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        eprintln!("Fatal: {}", e);
                        break;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(path) = &history {
        if let Err(e) = rl.save_history(path) {
            debug!("failed to save history to {}: {}", path.display(), e);
        }
    }
    Ok(())
}

/// コマンドを処理する（`false` ならセッション終了）
fn handle_command(session: &mut Session, line: &str) -> Result<bool> {
    let Some(command) = Command::parse(line) else {
        println!("Unknown command: {}", line);
        println!("Type 'help' for available commands.");
        return Ok(true);
    };

    match command {
        Command::Help => print_help(),
        Command::Quit => {
            println!("Goodbye!");
            return Ok(false);
        }
        Command::Print { format, expr } => {
            session.evaluate(&expr, format)?;
            session.show_displays();
        }
        Command::Call(expr) => {
            session.evaluate(&expr, DisplayFormat::Default)?;
            session.show_displays();
        }
        Command::Set { lvalue, value } => handle_set(session, &lvalue, &value)?,
        Command::Ptype(expr) => handle_ptype(session, &expr)?,
        Command::Display { format, expr } => handle_display(session, format, expr),
        Command::Undisplay(index) => {
            if !session.displays.remove(index) {
                println!("No display number {}.", index);
            }
        }
        Command::InfoDisplay => handle_info_display(session),
        Command::Frame => handle_frame(session)?,
    }

    Ok(true)
}

/// Setコマンドを処理する
fn handle_set(session: &Session, lvalue: &str, value: &str) -> Result<()> {
    let ctx = session.context();
    let parsed = engine::parse(lvalue).and_then(|l| Ok((l, engine::parse(value)?)));
    let (target, source) = match parsed {
        Ok(pair) => pair,
        Err(e) => return report(e),
    };
    match engine::assign(&ctx, &target, &source) {
        Ok(()) => {
            session.evaluate(lvalue, DisplayFormat::Default)?;
            session.show_displays();
            Ok(())
        }
        Err(e) => report(e),
    }
}

/// Ptypeコマンドを処理する
fn handle_ptype(session: &Session, expr: &str) -> Result<()> {
    let ctx = session.context();
    match engine::parse(expr).and_then(|handle| engine::describe_type(&ctx, &handle)) {
        Ok(text) => {
            println!("{}", text);
            Ok(())
        }
        Err(e) => report(e),
    }
}

/// Displayコマンドを処理する
fn handle_display(session: &mut Session, format: DisplayFormat, expr: Option<String>) {
    let Some(expr) = expr else {
        session.show_displays();
        return;
    };
    let index = session.displays.add(expr, format);
    let ctx = session.context();
    if let Some(entry) = session.displays.entries().iter().find(|e| e.index == index) {
        println!("{}", DisplayList::show(&ctx, entry, &session.options));
    }
}

fn handle_info_display(session: &Session) {
    if session.displays.is_empty() {
        println!("There are no auto-display expressions now.");
        return;
    }
    println!("Auto-display expressions now in effect:");
    println!("Num Enb Expression");
    for entry in session.displays.entries() {
        let suffix = match entry.format {
            DisplayFormat::Default => "",
            DisplayFormat::Object => "/o",
            DisplayFormat::Address => "/a",
            DisplayFormat::HexaDecimal => "/x",
        };
        println!("{}:   y  {}{}", entry.index, suffix, entry.text);
    }
}

/// Frameコマンドを処理する
fn handle_frame(session: &Session) -> Result<()> {
    let ctx = session.context();
    let Some(frame) = ctx.current_frame() else {
        println!("No stack.");
        return Ok(());
    };
    println!("#{} {} (thread {})", frame.level, frame.method, frame.thread);
    for local in &frame.locals {
        let handle = match engine::parse(&local.name) {
            Ok(handle) => handle,
            Err(e) => return report(e),
        };
        let text = match engine::evaluate(&ctx, &handle, &session.options) {
            Ok(text) => text,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => format!("<error: {}>", e),
        };
        let kind = if local.is_parameter { "arg" } else { "local" };
        println!("  {} {} = {}", kind, local.name, text);
    }
    Ok(())
}

/// スクリプトエラーは表示して続行し、内部エラーはセッションを終わらせる
fn report(e: EvalError) -> Result<()> {
    if e.is_fatal() {
        return Err(e.into());
    }
    match &e {
        EvalError::Syntax { position, .. } => eprintln!("Error at {}: {}", position, e),
        _ => eprintln!("Error: {}", e),
    }
    Ok(())
}

fn print_result(result: &EvaluationResult) {
    match result {
        EvaluationResult::Ok(text) => println!("{}", text),
        EvaluationResult::Exception { type_name, .. } => {
            println!("Exception of type `{}` was thrown in the target.", type_name)
        }
        EvaluationResult::InvalidExpression(message) => eprintln!("Error: {}", message),
        EvaluationResult::Timeout => eprintln!("Error: Evaluation timed out."),
    }
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help (h, ?)          - Show this help message");
    println!("  quit/exit/q          - Exit the debugger");
    println!();
    println!("Evaluation commands:");
    println!("  print[/fmt] <expr>   - Evaluate and print an expression (p, inspect)");
    println!("  call <expr>          - Invoke a method in the target (Ctrl-C aborts)");
    println!("  set <lvalue> = <expr> - Assign to a variable, field, element or register");
    println!("  ptype <expr|type>    - Describe the type of an expression (whatis)");
    println!("  frame (f)            - Show the current frame and its locals");
    println!();
    println!("Display commands:");
    println!("  display[/fmt] <expr> - Show an expression after every command");
    println!("  undisplay <n>        - Remove display number n");
    println!("  info display         - List display expressions");
    println!();
    println!("Formats: /o object, /a address, /x hexadecimal");
    println!();
    println!("Examples:");
    println!("  print foo.Data");
    println!("  p/x pub");
    println!("  print ((Demo.B) derived).BValue");
    println!("  call Tester.Hang()");
    println!("  set foo.Data = 42");
    println!("  ptype Demo.D");
}
