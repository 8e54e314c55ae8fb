use std::io::{BufRead, Write};

/// Prints `message` and reads one trimmed line. `None` at end of input.
pub(crate) fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    message: &str,
) -> anyhow::Result<Option<String>> {
    write!(output, "{message}")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

pub(crate) fn confirm<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> anyhow::Result<bool> {
    let answer = prompt(input, output, &format!("{question} [y/N] "))?;
    Ok(answer.is_some_and(|a| a.eq_ignore_ascii_case("y")))
}
