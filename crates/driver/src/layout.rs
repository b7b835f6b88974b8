use crate::session::Locator;

/// Where each control of the verification and address pages lives.
///
/// Fields are listed in the page's top-to-bottom order, which is also the order the
/// driver touches them in.
#[derive(Debug, Clone)]
pub struct FormLayout {
    pub code_input: Locator,
    pub code_submit: Locator,

    pub first_name: Locator,
    pub last_name: Locator,
    pub suffix: Locator,
    pub street_address: Locator,
    pub apartment: Locator,
    pub city: Locator,
    pub state: Locator,
    pub zip_code: Locator,

    pub validate_address: Locator,
    pub confirm_address: Locator,
    pub final_submit: Locator,
}

impl Default for FormLayout {
    fn default() -> Self {
        Self {
            code_input: Locator::css("#otp"),
            code_submit: Locator::css("button[type='submit']"),

            first_name: Locator::css("#first_name"),
            last_name: Locator::css("#last_name"),
            suffix: Locator::css("select[id='suffix']"),
            street_address: Locator::css("#address"),
            apartment: Locator::css("#address2"),
            city: Locator::css("#city"),
            state: Locator::css("select[id='state']"),
            zip_code: Locator::css("#zip"),

            validate_address: Locator::css("#validateaddress"),
            confirm_address: Locator::xpath("//button[contains(text(), 'Confirm Address')]"),
            final_submit: Locator::css("button[type='submit']"),
        }
    }
}
