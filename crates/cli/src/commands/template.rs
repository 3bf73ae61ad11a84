use athenaeum_core::{SiteRecord, encode_segment};

/// One page of the site index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub total_pages: usize,
    pub start: usize,
    pub end: usize,
}

/// Split `total_items` into pages of `per_page`, clamping `requested` to
/// the available range.
pub fn paginate(total_items: usize, per_page: usize, requested: i64) -> Pagination {
    let per_page = per_page.max(1);
    let total_pages = total_items.div_ceil(per_page);

    let page = if requested < 1 {
        1
    } else {
        usize::try_from(requested).unwrap_or(usize::MAX)
    };
    let page = page.min(total_pages.max(1));

    let start = ((page - 1) * per_page).min(total_items);
    let end = (start + per_page).min(total_items);

    Pagination {
        page,
        total_pages,
        start,
        end,
    }
}

/// Escape text for HTML element content and attribute values
pub fn html_escape(s: &str) -> String {
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

/// Render the paginated site index
pub fn render_index(
    sites: &[SiteRecord],
    pagination: Pagination,
    last_update: &str,
    version: &str,
) -> String {
    let cards: String = sites[pagination.start..pagination.end]
        .iter()
        .map(|site| {
            let href = format!("/{}/", encode_segment(&site.name));
            let preview = if site.has_entry_page() {
                format!(
                    r#"<img src="{}" alt="Preview of {}" class="preview" loading="lazy">"#,
                    html_escape(&site.preview_ref),
                    html_escape(&site.name)
                )
            } else {
                r#"<div class="preview missing">No preview</div>"#.to_string()
            };
            format!(
                r#"<a class="site-card" href="{}">
                    {}
                    <span class="site-name">{}</span>
                </a>"#,
                html_escape(&href),
                preview,
                html_escape(&site.name)
            )
        })
        .collect();

    let body = if sites.is_empty() {
        r#"<p class="empty">No sites yet. Add a directory under the content root.</p>"#.to_string()
    } else {
        format!(r#"<div class="grid">{}</div>"#, cards)
    };

    let nav = render_pagination(pagination);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Athenaeum</title>
    <style>
        * {{ margin: 0; padding: 0; box-sizing: border-box; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
            color: #222;
            background: #f5f5f5;
            padding: 2rem;
        }}
        header {{
            display: flex;
            justify-content: space-between;
            align-items: center;
            margin-bottom: 2rem;
        }}
        .grid {{
            display: grid;
            grid-template-columns: repeat(auto-fill, minmax(320px, 1fr));
            gap: 1.5rem;
        }}
        .site-card {{
            display: block;
            background: white;
            border-radius: 8px;
            box-shadow: 0 2px 8px rgba(0,0,0,0.1);
            overflow: hidden;
            color: inherit;
            text-decoration: none;
        }}
        .preview {{
            width: 100%;
            aspect-ratio: 16 / 9;
            object-fit: cover;
            display: block;
        }}
        .preview.missing {{
            display: flex;
            align-items: center;
            justify-content: center;
            background: #ddd;
            color: #777;
        }}
        .site-name {{
            display: block;
            padding: 1rem;
            font-weight: 600;
        }}
        .pagination {{
            margin-top: 2rem;
            display: flex;
            gap: 0.5rem;
            justify-content: center;
        }}
        .pagination a, .pagination span {{
            padding: 0.4rem 0.8rem;
            border-radius: 4px;
            background: white;
            color: inherit;
            text-decoration: none;
        }}
        .pagination .current {{
            background: #222;
            color: white;
        }}
        footer {{
            margin-top: 2rem;
            color: #999;
            font-size: 0.9rem;
            text-align: center;
        }}
    </style>
</head>
<body>
    <header>
        <h1>Athenaeum</h1>
        <div>
            <span id="refresh-status"></span>
            <button id="refresh-btn" type="button">Refresh</button>
        </div>
    </header>

    {}

    {}

    <footer>
        Last update: {} &middot; v{}
    </footer>

    <script>
        const button = document.getElementById('refresh-btn');
        const status = document.getElementById('refresh-status');
        button.addEventListener('click', async () => {{
            button.disabled = true;
            status.textContent = 'Updating...';
            try {{
                const response = await fetch('/refresh', {{ method: 'POST' }});
                const result = await response.json();
                status.textContent = result.message;
                if (result.status === 'success' && result.changes_count > 0) {{
                    location.reload();
                }}
            }} catch (err) {{
                status.textContent = 'Update failed';
            }} finally {{
                button.disabled = false;
            }}
        }});
    </script>
</body>
</html>"#,
        body,
        nav,
        html_escape(last_update),
        html_escape(version)
    )
}

fn render_pagination(pagination: Pagination) -> String {
    if pagination.total_pages <= 1 {
        return String::new();
    }

    let links: String = (1..=pagination.total_pages)
        .map(|page| {
            if page == pagination.page {
                format!(r#"<span class="current">{}</span>"#, page)
            } else {
                format!(r#"<a href="/?page={}">{}</a>"#, page, page)
            }
        })
        .collect();

    format!(r#"<nav class="pagination">{}</nav>"#, links)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_basic() {
        let p = paginate(10, 4, 1);
        assert_eq!((p.page, p.total_pages, p.start, p.end), (1, 3, 0, 4));

        let p = paginate(10, 4, 3);
        assert_eq!((p.page, p.start, p.end), (3, 8, 10));
    }

    #[test]
    fn test_paginate_clamps() {
        assert_eq!(paginate(10, 4, 0).page, 1);
        assert_eq!(paginate(10, 4, -5).page, 1);
        assert_eq!(paginate(10, 4, 99).page, 3);
        assert_eq!(paginate(10, 4, i64::MAX).page, 3);

        let empty = paginate(0, 4, 7);
        assert_eq!((empty.page, empty.total_pages, empty.start, empty.end), (1, 0, 0, 0));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_render_index_lists_current_page_only() {
        let sites: Vec<_> = ["a", "b", "c", "<script>"]
            .iter()
            .map(|n| SiteRecord::new(*n, format!("/nowhere/{}", n), "png", 0.0))
            .collect();

        let html = render_index(&sites, paginate(sites.len(), 2, 2), "N/A", "0.1.0");
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains(">a</span>"));
        assert!(html.contains(r#"<span class="current">2</span>"#));
        assert!(html.contains(r#"<a href="/?page=1">1</a>"#));
        assert!(html.contains("No preview"));
    }

    #[test]
    fn test_render_index_empty() {
        let html = render_index(&[], paginate(0, 4, 1), "N/A", "0.1.0");
        assert!(html.contains("No sites yet"));
        assert!(!html.contains("pagination\">"));
    }
}
