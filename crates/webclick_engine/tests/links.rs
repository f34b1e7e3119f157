use pretty_assertions::assert_eq;
use url::Url;
use webclick_core::ChildLink;
use webclick_engine::{extract_links, LinkFilter};

fn page(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}

fn urls(links: &[ChildLink]) -> Vec<&str> {
    links.iter().map(|l| l.url.as_str()).collect()
}

#[test]
fn links_keep_document_order_and_first_title() {
    let html = r##"
        <html><body>
          <a href="/b">Second</a>
          <a href="https://other.test/x#frag">Other</a>
          <a href="/a">First   title</a>
          <a href="/b">Duplicate</a>
          <a href="/a#section">Same page, other anchor</a>
        </body></html>"##;

    let links = extract_links(html, &page("https://site.test/index"), &LinkFilter::default());

    assert_eq!(
        links,
        vec![
            ChildLink::new("https://site.test/b", "Second"),
            ChildLink::new("https://other.test/x", "Other"),
            ChildLink::new("https://site.test/a", "First title"),
        ]
    );
}

#[test]
fn non_page_hrefs_and_self_links_are_skipped() {
    let html = r##"
        <a href="">empty</a>
        <a href="#top">anchor</a>
        <a href="javascript:void(0)">js</a>
        <a href="mailto:a@b.com">mail</a>
        <a href="tel:123">phone</a>
        <a href="ftp://files.test/x">ftp</a>
        <a href="/">home</a>
        <a href="https://site.test/#again">home again</a>
        <a href="/docs">docs</a>"##;

    let links = extract_links(html, &page("https://site.test"), &LinkFilter::default());

    assert_eq!(urls(&links), vec!["https://site.test/docs"]);
}

#[test]
fn binary_resources_are_skipped_unless_allowed() {
    let html = r#"
        <a href="/report.pdf">pdf</a>
        <a href="/photo.JPG">photo</a>
        <a href="/about.html">about</a>"#;
    let base = page("https://site.test/");

    let filtered = extract_links(html, &base, &LinkFilter::default());
    assert_eq!(urls(&filtered), vec!["https://site.test/about.html"]);

    let everything = LinkFilter {
        skip_binary_links: false,
        ..LinkFilter::default()
    };
    assert_eq!(extract_links(html, &base, &everything).len(), 3);
}

#[test]
fn same_host_filter_drops_external_links() {
    let html = r#"
        <a href="https://www.site.test/a">a</a>
        <a href="https://elsewhere.test/b">b</a>
        <a href="/c">c</a>"#;
    let filter = LinkFilter {
        same_host_only: true,
        ..LinkFilter::default()
    };

    let links = extract_links(html, &page("https://site.test/"), &filter);

    assert_eq!(
        urls(&links),
        vec!["https://www.site.test/a", "https://site.test/c"]
    );
}

#[test]
fn base_href_changes_resolution() {
    let html = r#"
        <html><head><base href="https://cdn.site.test/docs/"></head>
        <body><a href="intro">Intro</a></body></html>"#;

    let links = extract_links(html, &page("https://site.test/page"), &LinkFilter::default());

    assert_eq!(urls(&links), vec!["https://cdn.site.test/docs/intro"]);
}

#[test]
fn titles_fall_back_to_attribute_alt_then_url() {
    let html = r#"
        <a href="/t" title="  Titled   link ">  </a>
        <a href="/i"><img src="x.png" alt="Logo"></a>
        <a href="/n"></a>"#;

    let links = extract_links(html, &page("https://site.test/"), &LinkFilter::default());

    assert_eq!(
        links,
        vec![
            ChildLink::new("https://site.test/t", "Titled link"),
            ChildLink::new("https://site.test/i", "Logo"),
            ChildLink::new("https://site.test/n", "https://site.test/n"),
        ]
    );
}

#[test]
fn link_cap_limits_results() {
    let html: String = (0..10)
        .map(|i| format!(r#"<a href="/p{i}">p{i}</a>"#))
        .collect();
    let filter = LinkFilter {
        max_links: 4,
        ..LinkFilter::default()
    };

    let links = extract_links(&html, &page("https://site.test/"), &filter);

    assert_eq!(links.len(), 4);
    assert_eq!(links[3].url, "https://site.test/p3");
}
