//! # Control Panel Page
//!
//! Server-rendered HTML: motion links, speed/turns forms, and a small script
//! that polls `/getpos` for the live encoder reading.

use turntable_core::StageStatus;

/// Milliseconds between position polls in the browser.
const POSITION_POLL_MS: u32 = 150;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Banner shown while the stage cannot take commands.
fn readiness_banner(status: &StageStatus) -> String {
    if status.state.ready {
        return String::new();
    }
    match status.state.phase.error() {
        Some(error) => format!(
            r#"<p class="banner failed">Initialization failed: {}</p>"#,
            escape(error)
        ),
        None => format!(
            r#"<p class="banner">Stage not ready ({}), commands are ignored</p>"#,
            status.state.phase.name()
        ),
    }
}

/// Render the panel for the given snapshot.
///
/// With `static_assets`, the page pulls `/static/style.css` after the
/// built-in rules so a deployment can restyle it.
#[must_use]
pub fn render(title: &str, status: &StageStatus, static_assets: bool) -> String {
    let title = escape(title);
    let stylesheet = if static_assets {
        r#"<link rel="stylesheet" href="/static/style.css">"#
    } else {
        ""
    };
    let banner = readiness_banner(status);
    let speed = status.state.speed_limit;
    let turns = status.state.turn_increment;
    let position = status.position;
    let calibrate = if status.closed_loop {
        r#"<form method="post" action="/calibrate"><button>Anti-cogging calibration</button></form>"#
    } else {
        ""
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; max-width: 40em; margin: 2em auto; }}
nav a {{ display: inline-block; padding: .6em 1em; margin: .2em; border: 1px solid #888; text-decoration: none; }}
.banner {{ background: #fe8; padding: .5em; }}
.failed {{ background: #f99; }}
</style>
{stylesheet}
</head>
<body>
<h1>{title}</h1>
{banner}
<p>Position: <span id="position">{position}</span> ticks</p>
<nav>
<a href="/bigstepleft">&laquo;&laquo;</a>
<a href="/stepleft">&laquo;</a>
<a href="/home">Home</a>
<a href="/stepright">&raquo;</a>
<a href="/bigstepright">&raquo;&raquo;</a>
</nav>
<nav>
<a href="/turnleft">Turn</a>
<a href="/turnright">Turn back</a>
<a href="/stop">Stop</a>
</nav>
<form method="post" action="/setspeed">
<label>Speed <input name="speed" value="{speed}"></label>
<button>Set</button>
</form>
<form method="post" action="/setturns">
<label>Turns <input name="turns" value="{turns}"></label>
<button>Set</button>
</form>
<form method="post" action="/sethome"><button>Set home here</button></form>
{calibrate}
<script>
setInterval(function () {{
  fetch("/getpos").then(function (r) {{ return r.text(); }}).then(function (t) {{
    document.getElementById("position").textContent = t;
  }}).catch(function () {{}});
}}, {POSITION_POLL_MS});
</script>
</body>
</html>
"#
    )
}
