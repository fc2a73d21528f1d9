//! Nickname canonicalization for display-name matching.

use phf::phf_map;

static NICKNAMES: phf::Map<&'static str, &'static str> = phf_map! {
    "abby" => "abigail",
    "al" => "albert",
    "alex" => "alexander",
    "allie" => "allison",
    "ally" => "allison",
    "andy" => "andrew",
    "drew" => "andrew",
    "art" => "arthur",
    "barb" => "barbara",
    "becky" => "rebecca",
    "ben" => "benjamin",
    "benny" => "benjamin",
    "beth" => "elizabeth",
    "betty" => "elizabeth",
    "eliza" => "elizabeth",
    "liz" => "elizabeth",
    "lizzie" => "elizabeth",
    "bill" => "william",
    "billy" => "william",
    "will" => "william",
    "willy" => "william",
    "bob" => "robert",
    "bobby" => "robert",
    "rob" => "robert",
    "robbie" => "robert",
    "brad" => "bradley",
    "cass" => "cassandra",
    "cathy" => "catherine",
    "charlie" => "charles",
    "chuck" => "charles",
    "chris" => "christopher",
    "chrissy" => "christina",
    "tina" => "christina",
    "cindy" => "cynthia",
    "dan" => "daniel",
    "danny" => "daniel",
    "dave" => "david",
    "davey" => "david",
    "deb" => "deborah",
    "debbie" => "deborah",
    "dick" => "richard",
    "rich" => "richard",
    "rick" => "richard",
    "ricky" => "richard",
    "don" => "donald",
    "donny" => "donald",
    "doug" => "douglas",
    "ed" => "edward",
    "eddie" => "edward",
    "fred" => "frederick",
    "freddy" => "frederick",
    "gabe" => "gabriel",
    "greg" => "gregory",
    "hank" => "henry",
    "harry" => "henry",
    "jamie" => "james",
    "jim" => "james",
    "jimmy" => "james",
    "jeff" => "jeffrey",
    "jen" => "jennifer",
    "jenny" => "jennifer",
    "jerry" => "gerald",
    "jess" => "jessica",
    "jessie" => "jessica",
    "joe" => "joseph",
    "joey" => "joseph",
    "jon" => "jonathan",
    "josh" => "joshua",
    "kate" => "katherine",
    "kathy" => "katherine",
    "katie" => "katherine",
    "ken" => "kenneth",
    "kenny" => "kenneth",
    "kim" => "kimberly",
    "larry" => "lawrence",
    "lexi" => "alexis",
    "maggie" => "margaret",
    "meg" => "margaret",
    "peggy" => "margaret",
    "mandy" => "amanda",
    "manny" => "manuel",
    "matt" => "matthew",
    "mick" => "michael",
    "mike" => "michael",
    "mikey" => "michael",
    "mitch" => "mitchell",
    "nat" => "natalie",
    "nate" => "nathan",
    "nick" => "nicholas",
    "pam" => "pamela",
    "pat" => "patrick",
    "patty" => "patricia",
    "pete" => "peter",
    "phil" => "philip",
    "ray" => "raymond",
    "ron" => "ronald",
    "ronnie" => "ronald",
    "russ" => "russell",
    "sam" => "samuel",
    "sandy" => "sandra",
    "stan" => "stanley",
    "steve" => "steven",
    "stevie" => "steven",
    "sue" => "susan",
    "suzy" => "susan",
    "ted" => "theodore",
    "teddy" => "theodore",
    "tim" => "timothy",
    "timmy" => "timothy",
    "tom" => "thomas",
    "tommy" => "thomas",
    "tony" => "anthony",
    "val" => "valerie",
    "vicky" => "victoria",
    "vince" => "vincent",
    "walt" => "walter",
    "zach" => "zachary",
    "zack" => "zachary",
};

/// Lower-cases a name and swaps every known nickname token for its
/// canonical first name. Unknown tokens pass through unchanged.
pub fn canonicalize(name: &str) -> String {
    name.to_ascii_lowercase()
        .split_whitespace()
        .map(|token| NICKNAMES.get(token).copied().unwrap_or(token))
        .collect::<Vec<_>>()
        .join(" ")
}
