use clap::Parser;
use luadec::decompile::{decompile, DecompileOptions};
use luadec::undump::undump;

/// Decompile a compiled Lua 5.1 image
///
/// Prints the disassembly listing of every prototype in the image,
/// followed by the reconstructed pseudo-source.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to the compiled Lua file (luac 5.1 output)
    input: String,

    /// Promote every written register to a fresh local
    #[arg(short, long)]
    aggressive_locals: bool,

    /// Precede each output line with the pc range it covers
    #[arg(long)]
    annotate_lines: bool,

    /// Spaces per indentation level
    #[arg(short, long, default_value_t = 4)]
    indent: usize,
}

fn main() {
    let args = Args::parse();

    let image = match std::fs::read(&args.input) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("error reading {}: {e}", args.input);
            std::process::exit(1);
        }
    };

    let (_, chunk) = match undump(&image) {
        Ok(decoded) => decoded,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    print!("{chunk}");

    let options = DecompileOptions {
        aggressive_locals: args.aggressive_locals,
        annotate_lines: args.annotate_lines,
        indent_width: args.indent,
    };
    match decompile(&chunk, &options) {
        Ok(source) => {
            println!(
                "\n==== [[{}'s decompiled source]] ====\n",
                chunk.display_name()
            );
            println!("{source}");
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
