use anyhow::Result;
use faqbot_core::Pipeline;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

pub async fn run(pipeline: &Pipeline) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    println!("{}", pipeline.messages().greeting);

    loop {
        let line = match rl.readline("faqbot> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if matches!(trimmed.to_ascii_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        rl.add_history_entry(trimmed).ok();

        match pipeline.answer(trimmed).await {
            Ok(reply) => println!("{}\n", reply.text),
            Err(err) => {
                tracing::error!(%err, "query failed");
                println!("{}\n", pipeline.messages().error);
            }
        }
    }

    Ok(())
}
