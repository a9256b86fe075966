//! Translate a documentation tree
//!
//! Without `OPENAI_API_KEY` this only previews which files would be sent.
//!
//! ```text
//! cargo run --example translate_docs -- ./docs ./docs-ja
//! ```

use doc_translate::Config;
use std::env;

fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);
    let input = args.next().unwrap_or_else(|| "./docs".to_string());
    let output = args.next().unwrap_or_else(|| "./docs-translated".to_string());

    let mut builder = Config::builder()
        .input_dir(input)
        .output_dir(output)
        .extensions(["md", "rst", "txt"])
        .target_language("Japanese")
        .threads(4);

    match env::var("OPENAI_API_KEY") {
        Ok(key) => builder = builder.api_key(key),
        Err(_) => {
            println!("OPENAI_API_KEY not set - running in DRY RUN mode\n");
            builder = builder.dry_run(true);
        }
    }

    let stats = doc_translate::run(builder.build()?)?;

    println!("Translated:      {}", stats.translated);
    println!("Skipped:         {}", stats.skipped);
    println!("Failed:          {}", stats.failed);
    if stats.pending > 0 {
        println!("Would translate: {}", stats.pending);
    }

    Ok(())
}
