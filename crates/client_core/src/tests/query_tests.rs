use super::*;

#[test]
fn window_for_partial_last_page() {
    let window = PageWindow::new(2, PageSize::Ten, 25);
    assert_eq!((window.start, window.end), (21, 25));
    assert!(!window.has_next());
    assert!(window.has_previous());
}

#[test]
fn window_for_first_full_page() {
    let window = PageWindow::new(0, PageSize::Ten, 25);
    assert_eq!((window.start, window.end), (1, 10));
    assert!(window.has_next());
    assert!(!window.has_previous());
}

#[test]
fn empty_collection_shows_one_to_zero_and_disables_both_controls() {
    let window = PageWindow::new(0, PageSize::TwentyFive, 0);
    assert_eq!((window.start, window.end), (1, 0));
    assert!(!window.has_next());
    assert!(!window.has_previous());
}

#[test]
fn out_of_range_page_is_clamped_to_last_page() {
    let window = PageWindow::new(7, PageSize::Ten, 15);
    assert_eq!(window.page, 1);
    assert_eq!((window.start, window.end), (11, 15));
    assert_eq!(window.last_page(), 1);
}

#[test]
fn range_invariants_hold_across_pages_sizes_and_totals() {
    for limit in PageSize::ALL {
        for total in 0..=130u64 {
            for page in 0..=15u64 {
                let window = PageWindow::new(page, limit, total);
                if total > 0 {
                    assert!(
                        window.start <= window.end,
                        "page={page} limit={limit} total={total}"
                    );
                }
                assert!(window.end <= total);
                assert_eq!(window.has_next(), window.end < total);
                assert_eq!(!window.has_previous(), window.page == 0);
            }
        }
    }
}

#[test]
fn changing_query_inputs_resets_page() {
    let mut query = QueryState {
        page: 4,
        ..QueryState::default()
    };
    query.set_filter(LeadFilter::Job(Some("retired".into())));
    assert_eq!(query.page, 0);

    query.page = 3;
    query.set_sort(SortKey::ScoreLow);
    assert_eq!(query.page, 0);

    query.page = 2;
    query.set_limit(PageSize::Fifty);
    assert_eq!(query.page, 0);
    assert_eq!(query.skip(), 0);
}

#[test]
fn skip_saturates_instead_of_wrapping() {
    let query = QueryState {
        page: u64::MAX / 2,
        limit: PageSize::Fifty,
        ..QueryState::default()
    };
    assert_eq!(query.skip(), u64::MAX);
    assert_eq!(PageWindow::new(query.page, query.limit, 120).page, 2);
}

#[test]
fn params_carry_offset_and_filters() {
    let mut query = QueryState::default();
    query.set_limit(PageSize::TwentyFive);
    query.set_filter(LeadFilter::Status(Some(LeadStatus::Interested)));
    query.set_filter(LeadFilter::MinAge(Some(30)));
    query.page = 2;

    let params = query.to_params();
    assert_eq!(params.skip, 50);
    assert_eq!(params.limit, 25);
    assert_eq!(params.sort_by, SortKey::Newest);
    assert_eq!(params.status, Some(LeadStatus::Interested));
    assert_eq!(params.min_age, Some(30));
    assert_eq!(params.job, None);
}

#[test]
fn parse_filter_accepts_known_names_and_clears_on_empty() {
    assert_eq!(
        LeadFilter::parse("status", "interested").expect("status"),
        LeadFilter::Status(Some(LeadStatus::Interested))
    );
    assert_eq!(
        LeadFilter::parse("min_score", "0.7").expect("score"),
        LeadFilter::MinScore(Some(0.7))
    );
    assert_eq!(
        LeadFilter::parse("job", "  ").expect("job"),
        LeadFilter::Job(None)
    );
}

#[test]
fn parse_filter_rejects_bad_input() {
    assert!(matches!(
        LeadFilter::parse("salary", "10"),
        Err(ClientError::InvalidInput(_))
    ));
    assert!(matches!(
        LeadFilter::parse("min_score", "1.5"),
        Err(ClientError::InvalidInput(_))
    ));
    assert!(matches!(
        LeadFilter::parse("min_age", "thirty"),
        Err(ClientError::InvalidInput(_))
    ));
}

#[test]
fn blank_job_filter_is_treated_as_unset() {
    let mut filters = LeadFilters::default();
    filters.apply(LeadFilter::Job(Some("  ".into())));
    assert!(filters.is_empty());
}
