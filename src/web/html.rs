//! Server-rendered pages. Plain string building; every interpolated value
//! goes through [`escape`].

use std::fmt::Write;

use crate::spotify::{Playlist, Track};
use crate::suggest::Suggestion;

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

fn page(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title} · crossfade</title>\n</head>\n<body>\n\
         <header><a href=\"/\">crossfade</a></header>\n<main>\n{body}\n</main>\n</body>\n</html>\n",
        title = escape(title),
    )
}

pub fn landing(login_url: &str) -> String {
    page(
        "Welcome",
        &format!(
            "<h1>Find the song between two songs</h1>\n\
             <p>Connect your Spotify account to browse playlists and get transition suggestions.</p>\n\
             <p><a class=\"button\" href=\"{}\">Log in with Spotify</a></p>",
            escape(login_url)
        ),
    )
}

pub fn playlists(playlists: &[Playlist], ts: i64) -> String {
    let mut body = format!("<h1>Your playlists</h1>\n<p>{} playlists</p>\n<ul>\n", playlists.len());
    for p in playlists {
        let total = p.tracks.as_ref().map(|t| t.total).unwrap_or(0);
        let owner = p
            .owner
            .as_ref()
            .and_then(|o| o.display_name.as_deref())
            .unwrap_or("");
        let _ = writeln!(
            body,
            "<li><a href=\"/playlist/{id}?ts={ts}\">{name}</a> <small>{total} tracks · {owner}</small></li>",
            id = escape(&p.id),
            name = escape(&p.name),
            owner = escape(owner),
        );
    }
    body.push_str("</ul>");
    page("Playlists", &body)
}

pub fn playlist_tracks(tracks: &[Track]) -> String {
    let mut body = String::from(
        "<h1>Tracks</h1>\n<form method=\"get\" action=\"/transition\">\n<table>\n\
         <tr><th>From</th><th>To</th><th>Title</th><th>Artist</th><th>Album</th><th>Preview</th></tr>\n",
    );
    for t in tracks {
        let Some(id) = t.id.as_deref() else {
            continue;
        };
        let preview = t
            .preview_url
            .as_deref()
            .map(|url| format!("<audio controls preload=\"none\" src=\"{}\"></audio>", escape(url)))
            .unwrap_or_default();
        let _ = writeln!(
            body,
            "<tr><td><input type=\"radio\" name=\"track_id_1\" value=\"{id}\"></td>\
             <td><input type=\"radio\" name=\"track_id_2\" value=\"{id}\"></td>\
             <td>{name}</td><td>{artist}</td><td>{album}</td><td>{preview}</td></tr>",
            id = escape(id),
            name = escape(&t.name),
            artist = escape(t.primary_artist()),
            album = escape(t.album_name()),
        );
    }
    body.push_str(
        "</table>\n<label>Genres (optional, comma separated) <input name=\"genres\"></label>\n\
         <button type=\"submit\">Suggest transitions</button>\n</form>",
    );
    page("Tracks", &body)
}

pub fn suggestions(suggestions: &[Suggestion]) -> String {
    let mut body = String::from("<h1>Transition suggestions</h1>\n<ol>\n");
    for s in suggestions {
        let genre = s
            .genre
            .as_deref()
            .map(|g| format!(" <small>[{}]</small>", escape(g)))
            .unwrap_or_default();
        let preview = s
            .preview_url
            .as_deref()
            .map(|url| format!(" <audio controls preload=\"none\" src=\"{}\"></audio>", escape(url)))
            .unwrap_or_default();
        let _ = writeln!(
            body,
            "<li>{name} by {artist}{genre}{preview}</li>",
            name = escape(&s.name),
            artist = escape(&s.artist),
        );
    }
    body.push_str("</ol>");
    page("Suggestions", &body)
}

pub fn error(title: &str, message: &str) -> String {
    page(
        title,
        &format!(
            "<h1>{}</h1>\n<p>{}</p>\n<p><a href=\"/playlists\">Back to playlists</a></p>",
            escape(title),
            escape(message)
        ),
    )
}
