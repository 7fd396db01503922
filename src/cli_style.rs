use clap::builder::styling::{AnsiColor, Color, Style};
use clap::builder::Styles;

fn fg(color: AnsiColor) -> Style {
    Style::new().fg_color(Some(Color::Ansi(color)))
}

pub fn get_styles() -> Styles {
    Styles::styled()
        .usage(fg(AnsiColor::Magenta).bold())
        .header(fg(AnsiColor::Magenta).bold().underline())
        .literal(fg(AnsiColor::Cyan).bold())
        .invalid(fg(AnsiColor::Yellow).bold())
        .error(fg(AnsiColor::Red).bold())
        .valid(fg(AnsiColor::Green))
        .placeholder(fg(AnsiColor::BrightBlack))
}
